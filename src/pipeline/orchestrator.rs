//! Render orchestration - coordinates submission fan-out and reconciliation

use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use uuid::Uuid;

use crate::pipeline::{
    AdmissionController, ExternalStatus, GenerationBackend, GenerationJob, GenerationRequest,
    HealthLogger, JobRef, JobRepository, JobStatus, JobUpdate, MULTI_ANGLE_SET, PresetVariant,
    PromptBuilder, PromptOptions, ReconcileOutcome, RenderError, ResultStore, Severity,
    SubmitRenderRequest, VariantParams,
};

/// Top-level coordinator for the asynchronous render flow.
///
/// Submission fans out over the requested variants in parallel (bounded by
/// the fixed multi-angle set size), persists one row per variant regardless
/// of submit outcome, and returns all rows synchronously. Reconciliation is
/// pull-based: the caller decides when to poll.
pub struct RenderOrchestrator {
    backend: Arc<dyn GenerationBackend>,
    repository: Arc<dyn JobRepository>,
    store: Arc<dyn ResultStore>,
    health: Arc<dyn HealthLogger>,
    admission: AdmissionController,
    prompts: PromptBuilder,
}

impl RenderOrchestrator {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        repository: Arc<dyn JobRepository>,
        store: Arc<dyn ResultStore>,
        health: Arc<dyn HealthLogger>,
    ) -> Self {
        let admission = AdmissionController::new(Arc::clone(&repository));
        Self {
            backend,
            repository,
            store,
            health,
            admission,
            prompts: PromptBuilder::new(),
        }
    }

    /// Submit one render request, creating one job per resolved variant.
    ///
    /// Sibling variants are independent: one submit failure yields one
    /// terminal `failed` row and never touches its siblings. The batch insert
    /// is atomic; a write failure fails the whole request.
    pub async fn submit_render(
        &self,
        request: SubmitRenderRequest,
    ) -> Result<Vec<GenerationJob>, RenderError> {
        // 1. Validate before any external call
        if request.parent_entity_id.trim().is_empty() {
            return Err(RenderError::Validation(
                "parent_entity_id is required".to_string(),
            ));
        }
        let variants = self.resolve_variants(&request)?;

        // 2. Admission gate, once for the whole batch
        self.admission
            .admit(
                &request.organization_id,
                &request.parent_entity_id,
                variants.len(),
            )
            .await?;

        // 3. Version shared by every row of this request.
        // Count-then-insert; concurrent requests for one parent can collide
        // on the same version (see DESIGN.md).
        let version = self
            .repository
            .count_for_parent(&request.parent_entity_id, &[])
            .await?
            + 1;

        let angle_set_id = (variants.len() > 1).then(Uuid::new_v4);
        let multi = variants.len() > 1;

        tracing::info!(
            parent_entity_id = %request.parent_entity_id,
            variants = variants.len(),
            version,
            "submitting render request"
        );

        // 4. Fan out: prompt + submit + row construction per variant
        let rows = join_all(
            variants
                .iter()
                .map(|variant| self.submit_variant(&request, variant, version, angle_set_id, multi)),
        )
        .await;

        // 5. Atomic batch persist
        self.repository.insert_jobs(&rows).await?;
        Ok(rows)
    }

    /// Effective variant list: preset batch > multi-angle expansion > single
    fn resolve_variants(
        &self,
        request: &SubmitRenderRequest,
    ) -> Result<Vec<PresetVariant>, RenderError> {
        if let Some(preset) = request
            .preset_variants
            .as_ref()
            .filter(|preset| !preset.is_empty())
        {
            return Ok(preset.clone());
        }

        if request.multi_angle {
            if request.source_photo_url.is_none() {
                return Err(RenderError::Validation(
                    "multi-angle rendering requires a source photo".to_string(),
                ));
            }
            return Ok(MULTI_ANGLE_SET
                .iter()
                .map(|angle| PresetVariant {
                    angle: *angle,
                    lighting: request.lighting,
                    background: request.background,
                })
                .collect());
        }

        Ok(vec![PresetVariant {
            angle: crate::pipeline::Angle::Original,
            lighting: request.lighting,
            background: request.background,
        }])
    }

    async fn submit_variant(
        &self,
        request: &SubmitRenderRequest,
        variant: &PresetVariant,
        version: i64,
        angle_set_id: Option<Uuid>,
        multi_angle: bool,
    ) -> GenerationJob {
        let prompt = self.prompts.build(&PromptOptions {
            description: request.description.clone(),
            lighting: variant.lighting,
            background: variant.background,
            angle: variant.angle,
            custom_background: request.custom_background.clone(),
        });
        let generation = GenerationRequest::route(prompt.clone(), request.source_photo_url.clone());

        let id = Uuid::new_v4();
        let now = Utc::now();
        let mut job = GenerationJob {
            id,
            parent_entity_id: request.parent_entity_id.clone(),
            organization_id: request.organization_id.clone(),
            created_by: request.created_by.clone(),
            external_job_id: None,
            status: JobStatus::Queued,
            prompt,
            variant: VariantParams {
                lighting: variant.lighting,
                background: variant.background,
                angle: variant.angle,
                multi_angle,
                angle_set_id,
                custom_background: request.custom_background.clone(),
            },
            source_photo_url: request.source_photo_url.clone(),
            result_url: None,
            version,
            cost_estimate: generation.cost_estimate(),
            failure_note: None,
            created_at: now,
            updated_at: now,
        };

        match self.backend.submit(&generation).await {
            Ok(receipt) => {
                job.external_job_id = Some(receipt.external_job_id.clone());
                if receipt.status == ExternalStatus::Succeeded && !receipt.output.is_empty() {
                    // Rare synchronous completion from the provider
                    job.result_url = Some(
                        self.store_result(&job, &receipt.output[0]).await,
                    );
                    job.status = JobStatus::Succeeded;
                } else {
                    job.status = JobStatus::Generating;
                }
            }
            Err(err) => {
                // Straight from queued to failed; siblings are unaffected
                tracing::warn!(angle = variant.angle.as_str(), error = %err, "variant submit failed");
                self.health
                    .record(
                        &request.organization_id,
                        "render-submit",
                        &err.to_string(),
                        Severity::Error,
                    )
                    .await;
                job.status = JobStatus::Failed;
                job.failure_note = Some(err.to_string());
            }
        }
        job
    }

    /// Poll the external service once for `job_ref` and advance local state.
    ///
    /// Idempotent on terminal jobs: they are returned from the repository
    /// without a second poll. A poll failure leaves the row unchanged so the
    /// caller can retry.
    pub async fn reconcile(&self, job_ref: JobRef) -> Result<ReconcileOutcome, RenderError> {
        let job = match &job_ref {
            JobRef::Id(id) => self.repository.job_by_id(*id).await?,
            JobRef::External(external) => self.repository.job_by_external_id(external).await?,
        }
        .ok_or_else(|| RenderError::NotFound(format!("render job {job_ref:?}")))?;

        if job.status.is_terminal() {
            return Ok(ReconcileOutcome {
                job,
                progress: None,
            });
        }

        let external_job_id = job.external_job_id.clone().ok_or_else(|| {
            RenderError::Poll(format!("job {} has no external job id", job.id))
        })?;

        let snapshot = self.backend.poll(&external_job_id).await?;
        let status = snapshot.status.as_job_status();

        let update = match snapshot.status {
            ExternalStatus::Succeeded => match snapshot.output.first() {
                Some(output_url) => JobUpdate {
                    status,
                    result_url: Some(self.store_result(&job, output_url).await),
                    failure_note: None,
                },
                // A success report with no output has nothing to persist;
                // recorded as a failed prediction
                None => JobUpdate {
                    status: JobStatus::Failed,
                    result_url: None,
                    failure_note: Some("prediction succeeded without output".to_string()),
                },
            },
            ExternalStatus::Failed => JobUpdate {
                status,
                result_url: None,
                failure_note: Some(
                    snapshot
                        .error
                        .clone()
                        .unwrap_or_else(|| "prediction failed".to_string()),
                ),
            },
            _ => JobUpdate {
                status,
                result_url: None,
                failure_note: None,
            },
        };

        let updated = self.repository.update_job(job.id, &update).await?;
        tracing::debug!(job_id = %updated.id, status = %updated.status, "reconciled render job");
        Ok(ReconcileOutcome {
            job: updated,
            progress: snapshot.progress,
        })
    }

    /// Archive an externally hosted output into durable storage, degrading to
    /// the external URL when the upload fails
    async fn store_result(&self, job: &GenerationJob, external_url: &str) -> String {
        let path = format!("renders/{}/{}.jpg", job.parent_entity_id, job.id);
        match self.store.archive(external_url, &path).await {
            Ok(url) => url,
            Err(err) => {
                self.health
                    .record(
                        &job.organization_id,
                        "render-storage",
                        &err.to_string(),
                        Severity::Error,
                    )
                    .await;
                external_url.to_string()
            }
        }
    }
}
