//! Port interfaces for the render pipeline domain

use async_trait::async_trait;
use uuid::Uuid;

use crate::pipeline::{
    GenerationJob, GenerationRequest, JobStatus, JobUpdate, MockupJob, MockupTemplate,
    MockupUpdate, PollSnapshot, RenderError, RenderSettings, Severity, SubmitReceipt,
};

/// Submit/poll contract over the external image-generation service
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Start a generation; fails with [`RenderError::Submit`] when the
    /// service rejects the job
    async fn submit(&self, request: &GenerationRequest) -> Result<SubmitReceipt, RenderError>;

    /// Query current status of an in-flight generation
    async fn poll(&self, external_job_id: &str) -> Result<PollSnapshot, RenderError>;

    /// Poll on a fixed interval until a terminal status or a hard deadline.
    /// Only the synchronous mockup flow uses this; the render flow polls once
    /// per caller-initiated reconciliation.
    async fn await_terminal(&self, external_job_id: &str) -> Result<PollSnapshot, RenderError>;
}

/// Converts a brand brief (+ optional logo) into a generation prompt
#[async_trait]
pub trait BrandAnalyzer: Send + Sync {
    /// Callers must fall back to [`BrandBrief::fallback_prompt`] on any error
    ///
    /// [`BrandBrief::fallback_prompt`]: crate::pipeline::BrandBrief::fallback_prompt
    async fn compose_prompt(
        &self,
        brief: &crate::pipeline::BrandBrief,
    ) -> Result<String, RenderError>;
}

/// Persistence for job rows and per-organization render settings.
///
/// Rows are exclusively owned here; the orchestrator and reconciliation path
/// only read-modify-write through this interface.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Atomic batch insert; either every row persists or none does
    async fn insert_jobs(&self, jobs: &[GenerationJob]) -> Result<(), RenderError>;

    async fn job_by_id(&self, id: Uuid) -> Result<Option<GenerationJob>, RenderError>;

    async fn job_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<GenerationJob>, RenderError>;

    /// Apply `update` and stamp `updated_at`, but only while the row is
    /// non-terminal; a stale reconciliation can never overwrite a terminal
    /// state. Returns the stored row either way.
    async fn update_job(&self, id: Uuid, update: &JobUpdate) -> Result<GenerationJob, RenderError>;

    /// Count jobs for a parent entity, excluding the given statuses
    async fn count_for_parent(
        &self,
        parent_entity_id: &str,
        excluding: &[JobStatus],
    ) -> Result<i64, RenderError>;

    /// Effective settings for an organization; defaults when absent
    async fn render_settings(&self, organization_id: &str) -> Result<RenderSettings, RenderError>;

    async fn insert_mockup(&self, job: &MockupJob) -> Result<(), RenderError>;

    async fn update_mockup(
        &self,
        id: Uuid,
        update: &MockupUpdate,
    ) -> Result<MockupJob, RenderError>;

    /// Look up a mockup template; `None` means no such template exists
    async fn template(&self, template_id: &str)
        -> Result<Option<MockupTemplate>, RenderError>;
}

/// Durable storage for final artifacts, addressed by public URL
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persist raw bytes and return a stable, publicly fetchable URL
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, RenderError>;

    /// Download an externally hosted artifact and re-upload it under `path`
    async fn archive(&self, source_url: &str, path: &str) -> Result<String, RenderError>;

    /// Public URL for an already-stored path
    fn public_url(&self, path: &str) -> String;
}

/// Deterministic template-over-design compositing step
#[async_trait]
pub trait Compositor: Send + Sync {
    /// Fetch both images and produce the composited, color-adjusted,
    /// sharpened PNG
    async fn composite(&self, base_url: &str, design_url: &str) -> Result<Vec<u8>, RenderError>;
}

/// Fire-and-forget diagnostics sink; implementations swallow their own errors
#[async_trait]
pub trait HealthLogger: Send + Sync {
    async fn record(&self, organization_id: &str, service: &str, message: &str, severity: Severity);
}
