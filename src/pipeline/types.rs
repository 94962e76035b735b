//! Core types for the render pipeline domain

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::pipeline::RenderError;

/// Cost estimate for an image-conditioned variant (source photo present)
pub const IMAGE_CONDITIONED_COST: f64 = 0.012;

/// Cost estimate for a text-conditioned variant
pub const TEXT_CONDITIONED_COST: f64 = 0.006;

/// Default admission ceiling when an organization has no stored settings
pub const DEFAULT_MAX_RENDERS_PER_PARENT: i64 = 20;

/// The fixed angle set expanded for a multi-angle request
pub const MULTI_ANGLE_SET: [Angle; 5] = [
    Angle::Original,
    Angle::Front,
    Angle::Side,
    Angle::Rear,
    Angle::ThreeQuarter,
];

/// Lifecycle state of a [`GenerationJob`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Generating,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl JobStatus {
    /// Terminal states are absorbing; no reconciliation may rewind them
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Canceled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Generating => "generating",
            JobStatus::Processing => "processing",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "generating" => Ok(JobStatus::Generating),
            "processing" => Ok(JobStatus::Processing),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            "canceled" => Ok(JobStatus::Canceled),
            _ => Err(RenderError::Validation(format!("unknown job status: {s}"))),
        }
    }
}

/// Lighting axis of the prompt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lighting {
    #[default]
    Showroom,
    Daylight,
    Overcast,
    GoldenHour,
    Night,
}

impl Lighting {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lighting::Showroom => "showroom",
            Lighting::Daylight => "daylight",
            Lighting::Overcast => "overcast",
            Lighting::GoldenHour => "golden_hour",
            Lighting::Night => "night",
        }
    }
}

impl FromStr for Lighting {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "showroom" => Ok(Lighting::Showroom),
            "daylight" => Ok(Lighting::Daylight),
            "overcast" => Ok(Lighting::Overcast),
            "golden_hour" => Ok(Lighting::GoldenHour),
            "night" => Ok(Lighting::Night),
            _ => Err(RenderError::Validation(format!("unknown lighting: {s}"))),
        }
    }
}

/// Background axis of the prompt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Background {
    #[default]
    Studio,
    CityStreet,
    Dealership,
    Custom,
}

impl Background {
    pub fn as_str(&self) -> &'static str {
        match self {
            Background::Studio => "studio",
            Background::CityStreet => "city_street",
            Background::Dealership => "dealership",
            Background::Custom => "custom",
        }
    }
}

impl FromStr for Background {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "studio" => Ok(Background::Studio),
            "city_street" => Ok(Background::CityStreet),
            "dealership" => Ok(Background::Dealership),
            "custom" => Ok(Background::Custom),
            _ => Err(RenderError::Validation(format!("unknown background: {s}"))),
        }
    }
}

/// Camera angle axis of the prompt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Angle {
    #[default]
    Original,
    Front,
    Side,
    Rear,
    ThreeQuarter,
}

impl Angle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Angle::Original => "original",
            Angle::Front => "front",
            Angle::Side => "side",
            Angle::Rear => "rear",
            Angle::ThreeQuarter => "three_quarter",
        }
    }
}

impl FromStr for Angle {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "original" => Ok(Angle::Original),
            "front" => Ok(Angle::Front),
            "side" => Ok(Angle::Side),
            "rear" => Ok(Angle::Rear),
            "three_quarter" => Ok(Angle::ThreeQuarter),
            _ => Err(RenderError::Validation(format!("unknown angle: {s}"))),
        }
    }
}

/// Style parameters for one requested variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantParams {
    pub lighting: Lighting,
    pub background: Background,
    pub angle: Angle,
    pub multi_angle: bool,
    /// Group key shared by sibling variants of one multi-angle request
    pub angle_set_id: Option<Uuid>,
    /// Free-text background override, honored when `background` is `Custom`
    pub custom_background: Option<String>,
}

/// One row per requested image variant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: Uuid,
    pub parent_entity_id: String,
    pub organization_id: String,
    pub created_by: String,
    /// Set once a submit call succeeds; never reassigned afterwards
    pub external_job_id: Option<String>,
    pub status: JobStatus,
    pub prompt: String,
    pub variant: VariantParams,
    /// Absent implies a text-to-image variant
    pub source_photo_url: Option<String>,
    /// Set if and only if `status == Succeeded`
    pub result_url: Option<String>,
    /// Monotonically increasing per `parent_entity_id`
    pub version: i64,
    pub cost_estimate: f64,
    pub failure_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-organization render settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RenderSettings {
    pub max_renders_per_parent: i64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            max_renders_per_parent: DEFAULT_MAX_RENDERS_PER_PARENT,
        }
    }
}

/// Lifecycle state of a [`MockupJob`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MockupStatus {
    Generating,
    Complete,
    Failed,
}

impl MockupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MockupStatus::Generating => "generating",
            MockupStatus::Complete => "complete",
            MockupStatus::Failed => "failed",
        }
    }
}

impl FromStr for MockupStatus {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generating" => Ok(MockupStatus::Generating),
            "complete" => Ok(MockupStatus::Complete),
            "failed" => Ok(MockupStatus::Failed),
            _ => Err(RenderError::Validation(format!(
                "unknown mockup status: {s}"
            ))),
        }
    }
}

/// Brand-mockup unit of work; simpler lifecycle than [`GenerationJob`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockupJob {
    pub id: Uuid,
    pub organization_id: String,
    pub parent_entity_id: Option<String>,
    pub template_id: String,
    pub status: MockupStatus,
    /// Prompt actually sent to the generation service
    pub prompt: Option<String>,
    /// Raw generated graphic, pre-compositing
    pub flat_design_url: Option<String>,
    /// Final composited artifact
    pub final_result_url: Option<String>,
    pub failure_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Brand brief driving the mockup flow
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrandBrief {
    pub company_name: String,
    pub industry: Option<String>,
    pub brand_colors: Vec<String>,
    pub style_notes: Option<String>,
    pub logo_url: Option<String>,
}

impl BrandBrief {
    /// Deterministic prompt used whenever brand analysis fails.
    /// Built from the brief fields only, so the mockup pipeline never aborts
    /// on an analysis error.
    pub fn fallback_prompt(&self) -> String {
        let mut prompt = format!(
            "Professional vehicle wrap design for {}",
            if self.company_name.is_empty() {
                "a business"
            } else {
                &self.company_name
            }
        );
        if let Some(industry) = &self.industry {
            prompt.push_str(&format!(", {industry} industry"));
        }
        if !self.brand_colors.is_empty() {
            prompt.push_str(&format!(", brand colors {}", self.brand_colors.join(", ")));
        }
        if let Some(notes) = &self.style_notes {
            prompt.push_str(&format!(", {notes}"));
        }
        prompt
    }
}

/// Stored mockup template. `base_image_url` is optional; a template without
/// one skips the compositing stage but is still valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockupTemplate {
    pub id: String,
    pub base_image_url: Option<String>,
}

/// Routed request to the external generation service.
///
/// Which variant applies is decided once at the orchestrator boundary: a
/// source photo routes to the image-conditioned generator, its absence to the
/// text-conditioned one.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationRequest {
    TextToImage { prompt: String },
    ImageToImage { prompt: String, source_image_url: String },
}

impl GenerationRequest {
    /// Route on source-photo presence; part of the backend contract
    pub fn route(prompt: String, source_photo_url: Option<String>) -> Self {
        match source_photo_url {
            Some(source_image_url) => GenerationRequest::ImageToImage {
                prompt,
                source_image_url,
            },
            None => GenerationRequest::TextToImage { prompt },
        }
    }

    pub fn prompt(&self) -> &str {
        match self {
            GenerationRequest::TextToImage { prompt }
            | GenerationRequest::ImageToImage { prompt, .. } => prompt,
        }
    }

    /// Fixed cost per variant kind
    pub fn cost_estimate(&self) -> f64 {
        match self {
            GenerationRequest::TextToImage { .. } => TEXT_CONDITIONED_COST,
            GenerationRequest::ImageToImage { .. } => IMAGE_CONDITIONED_COST,
        }
    }
}

/// Normalized status reported by the external generation service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl ExternalStatus {
    /// Map a provider status string onto the internal state machine;
    /// unrecognized values are treated as still starting
    pub fn from_provider(raw: &str) -> Self {
        match raw {
            "succeeded" => ExternalStatus::Succeeded,
            "failed" => ExternalStatus::Failed,
            "canceled" => ExternalStatus::Canceled,
            "processing" => ExternalStatus::Processing,
            _ => ExternalStatus::Starting,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExternalStatus::Succeeded | ExternalStatus::Failed | ExternalStatus::Canceled
        )
    }

    /// In-flight job status corresponding to this external report
    pub fn as_job_status(&self) -> JobStatus {
        match self {
            ExternalStatus::Starting => JobStatus::Generating,
            ExternalStatus::Processing => JobStatus::Processing,
            ExternalStatus::Succeeded => JobStatus::Succeeded,
            ExternalStatus::Failed => JobStatus::Failed,
            ExternalStatus::Canceled => JobStatus::Canceled,
        }
    }
}

/// Acknowledgement returned by a submit call
#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    pub external_job_id: String,
    pub status: ExternalStatus,
    /// Output URLs when the provider completed synchronously (rare fast path)
    pub output: Vec<String>,
}

/// Point-in-time view of an external job, returned by a poll call
#[derive(Debug, Clone)]
pub struct PollSnapshot {
    pub external_job_id: String,
    pub status: ExternalStatus,
    pub output: Vec<String>,
    pub error: Option<String>,
    /// Best-effort completion estimate in percent, when the provider exposes
    /// enough signal to derive one
    pub progress: Option<u8>,
}

/// Reference to a job by either its own id or the external prediction id
#[derive(Debug, Clone)]
pub enum JobRef {
    Id(Uuid),
    External(String),
}

impl From<&str> for JobRef {
    fn from(s: &str) -> Self {
        match Uuid::parse_str(s) {
            Ok(id) => JobRef::Id(id),
            Err(_) => JobRef::External(s.to_string()),
        }
    }
}

/// Result of one reconciliation call
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub job: GenerationJob,
    pub progress: Option<u8>,
}

/// Fields a reconciliation may change on a job row
#[derive(Debug, Clone)]
pub struct JobUpdate {
    pub status: JobStatus,
    pub result_url: Option<String>,
    pub failure_note: Option<String>,
}

/// Fields the mockup flow may change on a mockup row
#[derive(Debug, Clone, Default)]
pub struct MockupUpdate {
    pub status: Option<MockupStatus>,
    pub prompt: Option<String>,
    pub flat_design_url: Option<String>,
    pub final_result_url: Option<String>,
    pub failure_note: Option<String>,
}

/// One explicit angle/style combination in a preset batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetVariant {
    pub angle: Angle,
    pub lighting: Lighting,
    pub background: Background,
}

/// Request to start one or more renders for a parent entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRenderRequest {
    pub parent_entity_id: String,
    pub organization_id: String,
    pub created_by: String,
    pub source_photo_url: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub lighting: Lighting,
    #[serde(default)]
    pub background: Background,
    #[serde(default)]
    pub multi_angle: bool,
    pub custom_background: Option<String>,
    /// Explicit combinations overriding the multi-angle expansion
    pub preset_variants: Option<Vec<PresetVariant>>,
}

/// Request to run the synchronous brand-mockup flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitMockupRequest {
    pub template_id: String,
    pub organization_id: String,
    pub parent_entity_id: Option<String>,
    pub brief: BrandBrief,
}

/// Diagnostics severity for the health log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}
