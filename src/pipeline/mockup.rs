//! Brand-mockup flow - synchronous, best-effort pipeline from brief to
//! composited mockup

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::pipeline::{
    BrandAnalyzer, Compositor, ExternalStatus, GenerationBackend, GenerationRequest, HealthLogger,
    JobRepository, MockupJob, MockupStatus, MockupUpdate, RenderError, ResultStore, Severity,
    SubmitMockupRequest,
};

/// Directive appended to the analyzed prompt so the generator produces a
/// flat graphic rather than a rendered vehicle
const FLAT_DESIGN_DIRECTIVE: &str = "Flat lay vehicle wrap graphic design, no vehicle shape, \
     pure graphic design only, commercial wrap art, seamless tiling pattern, \
     high resolution print ready.";

/// Fire-and-complete mockup pipeline: brand analysis, flat-design
/// generation with a bounded wait, template compositing, storage.
///
/// Every stage past generation degrades gracefully; only a failed or
/// timed-out generation marks the mockup `failed`.
pub struct MockupPipeline {
    backend: Arc<dyn GenerationBackend>,
    analyzer: Arc<dyn BrandAnalyzer>,
    repository: Arc<dyn JobRepository>,
    store: Arc<dyn ResultStore>,
    compositor: Arc<dyn Compositor>,
    health: Arc<dyn HealthLogger>,
}

impl MockupPipeline {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        analyzer: Arc<dyn BrandAnalyzer>,
        repository: Arc<dyn JobRepository>,
        store: Arc<dyn ResultStore>,
        compositor: Arc<dyn Compositor>,
        health: Arc<dyn HealthLogger>,
    ) -> Self {
        Self {
            backend,
            analyzer,
            repository,
            store,
            compositor,
            health,
        }
    }

    pub async fn run(&self, request: SubmitMockupRequest) -> Result<MockupJob, RenderError> {
        if request.template_id.trim().is_empty() {
            return Err(RenderError::Validation("template_id is required".to_string()));
        }
        // Unknown templates are rejected before any record is created; a
        // template without a base image is still valid and skips compositing
        let template = self
            .repository
            .template(&request.template_id)
            .await?
            .ok_or_else(|| {
                RenderError::NotFound(format!("template {}", request.template_id))
            })?;

        let now = Utc::now();
        let job = MockupJob {
            id: Uuid::new_v4(),
            organization_id: request.organization_id.clone(),
            parent_entity_id: request.parent_entity_id.clone(),
            template_id: request.template_id.clone(),
            status: MockupStatus::Generating,
            prompt: None,
            flat_design_url: None,
            final_result_url: None,
            failure_note: None,
            created_at: now,
            updated_at: now,
        };
        self.repository.insert_mockup(&job).await?;

        // 1. Brand analysis; never aborts the pipeline
        let prompt = match self.analyzer.compose_prompt(&request.brief).await {
            Ok(text) => text,
            Err(err) => {
                self.health
                    .record(
                        &request.organization_id,
                        "mockup-brand-analysis",
                        &err.to_string(),
                        Severity::Error,
                    )
                    .await;
                request.brief.fallback_prompt()
            }
        };

        // 2. Flat design generation with the bounded wait
        let flat_design_url = match self.generate_flat_design(&job, &prompt).await {
            Ok(url) => url,
            Err(err) => {
                self.health
                    .record(
                        &request.organization_id,
                        "mockup-generation",
                        &err.to_string(),
                        Severity::Error,
                    )
                    .await;
                return self
                    .repository
                    .update_mockup(
                        job.id,
                        &MockupUpdate {
                            status: Some(MockupStatus::Failed),
                            prompt: Some(prompt),
                            failure_note: Some(err.to_string()),
                            ..Default::default()
                        },
                    )
                    .await;
            }
        };

        // 3. Composite over the template base, degrading to the flat design
        let final_result_url = self
            .composite_over_template(&job, template.base_image_url.as_deref(), &flat_design_url)
            .await
            .unwrap_or_else(|| flat_design_url.clone());

        // 4. Terminal update
        self.repository
            .update_mockup(
                job.id,
                &MockupUpdate {
                    status: Some(MockupStatus::Complete),
                    prompt: Some(prompt),
                    flat_design_url: Some(flat_design_url),
                    final_result_url: Some(final_result_url),
                    ..Default::default()
                },
            )
            .await
    }

    /// Submit the flat-design generation and wait for its output, archiving
    /// it into durable storage
    async fn generate_flat_design(
        &self,
        job: &MockupJob,
        prompt: &str,
    ) -> Result<String, RenderError> {
        let generation = GenerationRequest::TextToImage {
            prompt: format!("{prompt}. {FLAT_DESIGN_DIRECTIVE}"),
        };
        let receipt = self.backend.submit(&generation).await?;

        let output = if receipt.status == ExternalStatus::Succeeded && !receipt.output.is_empty() {
            receipt.output
        } else {
            let snapshot = self.backend.await_terminal(&receipt.external_job_id).await?;
            match snapshot.status {
                ExternalStatus::Succeeded => snapshot.output,
                _ => {
                    return Err(RenderError::Submit(
                        snapshot
                            .error
                            .unwrap_or_else(|| "flat design generation failed".to_string()),
                    ));
                }
            }
        };
        let external_url = output
            .first()
            .ok_or_else(|| RenderError::Submit("no output URL returned".to_string()))?;

        let path = format!("mockups/{}/flat-design.png", job.id);
        match self.store.archive(external_url, &path).await {
            Ok(url) => Ok(url),
            Err(err) => {
                self.health
                    .record(
                        &job.organization_id,
                        "mockup-storage",
                        &err.to_string(),
                        Severity::Error,
                    )
                    .await;
                Ok(external_url.clone())
            }
        }
    }

    /// Composite the flat design over the template base image; `None` means
    /// the caller should fall back to the un-composited flat design
    async fn composite_over_template(
        &self,
        job: &MockupJob,
        base_image_url: Option<&str>,
        flat_design_url: &str,
    ) -> Option<String> {
        let base_url = base_image_url?;

        let composited = match self.compositor.composite(base_url, flat_design_url).await {
            Ok(bytes) => bytes,
            Err(err) => {
                self.health
                    .record(
                        &job.organization_id,
                        "mockup-compositing",
                        &err.to_string(),
                        Severity::Error,
                    )
                    .await;
                return None;
            }
        };

        let path = format!("mockups/{}/composited.png", job.id);
        match self.store.put(&path, composited, "image/png").await {
            Ok(url) => Some(url),
            Err(err) => {
                self.health
                    .record(
                        &job.organization_id,
                        "mockup-storage",
                        &err.to_string(),
                        Severity::Error,
                    )
                    .await;
                None
            }
        }
    }
}
