//! Admission control - per-parent render quota enforcement

use std::sync::Arc;

use crate::pipeline::{JobRepository, JobStatus, RenderError};

/// Gates new jobs on the organization's per-parent render ceiling.
///
/// Evaluated once per request, so a multi-variant batch either fully clears
/// the gate or is fully rejected before any external call is made.
pub struct AdmissionController {
    repository: Arc<dyn JobRepository>,
}

impl AdmissionController {
    pub fn new(repository: Arc<dyn JobRepository>) -> Self {
        Self { repository }
    }

    /// Reject when the batch would push the parent past the ceiling.
    /// Failed and canceled jobs do not count against the quota.
    pub async fn admit(
        &self,
        organization_id: &str,
        parent_entity_id: &str,
        requested: usize,
    ) -> Result<(), RenderError> {
        let settings = self.repository.render_settings(organization_id).await?;
        let existing = self
            .repository
            .count_for_parent(parent_entity_id, &[JobStatus::Failed, JobStatus::Canceled])
            .await?;

        let max = settings.max_renders_per_parent;
        if existing + requested as i64 > max {
            return Err(RenderError::Admission(format!(
                "render limit would be exceeded; {} renders remaining for this parent",
                (max - existing).max(0)
            )));
        }

        tracing::debug!(
            parent_entity_id,
            existing,
            requested,
            max,
            "admission check passed"
        );
        Ok(())
    }
}
