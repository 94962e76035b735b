//! HTTP client for the external image-generation service
//!
//! Wraps a Replicate-shaped prediction API: one POST per submit against a
//! model-specific endpoint, one GET per poll. Model selection is a pure
//! function of the request variant.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use url::Url;

use crate::pipeline::{
    ExternalStatus, GenerationBackend, GenerationRequest, PollSnapshot, RenderError, SubmitReceipt,
};

/// Image-conditioned variant generator; preserves the source photo's
/// structure while restyling its surface
const IMAGE_CONDITIONED_MODEL: &str = "black-forest-labs/flux-dev";

/// Text-conditioned generator
const TEXT_CONDITIONED_MODEL: &str = "black-forest-labs/flux-schnell";

/// How strongly the image-conditioned model may depart from the source
/// photo (0 keeps the original, 1 ignores it)
const PROMPT_STRENGTH: f64 = 0.70;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_POLL_DEADLINE: Duration = Duration::from_secs(120);

static PERCENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)%").expect("valid regex"));

#[derive(Debug, Deserialize)]
struct PredictionResponse {
    id: String,
    status: String,
    #[serde(default, deserialize_with = "one_or_many")]
    output: Vec<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    logs: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

/// The provider returns output as a single string, an array of strings, or
/// an array of objects carrying a `url` field
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Entry {
        Url(String),
        Object { url: String },
    }

    impl Entry {
        fn into_url(self) -> String {
            match self {
                Entry::Url(url) | Entry::Object { url } => url,
            }
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(Entry),
        Many(Vec<Entry>),
        None,
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(entry) => vec![entry.into_url()],
        OneOrMany::Many(entries) => entries.into_iter().map(Entry::into_url).collect(),
        OneOrMany::None => vec![],
    })
}

/// Submit/poll client over the prediction API
pub struct HttpGenerationClient {
    client: Client,
    base_url: Url,
    token: String,
    poll_interval: Duration,
    poll_deadline: Duration,
}

impl HttpGenerationClient {
    pub fn new(base_url: Url, token: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url,
            token: token.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_deadline: DEFAULT_POLL_DEADLINE,
        }
    }

    /// Override the bounded-wait timing; used by tests and fast providers
    pub fn with_poll_timing(mut self, interval: Duration, deadline: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_deadline = deadline;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, RenderError> {
        self.base_url
            .join(path)
            .map_err(|e| RenderError::Submit(format!("invalid endpoint {path}: {e}")))
    }

    /// Provider input payload for a request; routing and knobs are part of
    /// the contract
    fn model_and_input(request: &GenerationRequest) -> (&'static str, serde_json::Value) {
        match request {
            GenerationRequest::ImageToImage {
                prompt,
                source_image_url,
            } => (
                IMAGE_CONDITIONED_MODEL,
                json!({
                    "prompt": prompt,
                    "image": source_image_url,
                    "prompt_strength": PROMPT_STRENGTH,
                    "num_inference_steps": 28,
                    "guidance": 3.5,
                    "output_format": "jpg",
                    "output_quality": 90,
                }),
            ),
            GenerationRequest::TextToImage { prompt } => (
                TEXT_CONDITIONED_MODEL,
                json!({
                    "prompt": prompt,
                    "num_outputs": 1,
                    "aspect_ratio": "4:3",
                    "output_format": "jpg",
                    "output_quality": 90,
                    "go_fast": true,
                }),
            ),
        }
    }
}

#[async_trait]
impl GenerationBackend for HttpGenerationClient {
    async fn submit(&self, request: &GenerationRequest) -> Result<SubmitReceipt, RenderError> {
        let (model, input) = Self::model_and_input(request);
        let endpoint = self.endpoint(&format!("v1/models/{model}/predictions"))?;

        let response = self
            .client
            .post(endpoint)
            .bearer_auth(&self.token)
            .json(&json!({ "input": input }))
            .send()
            .await
            .map_err(|e| RenderError::Submit(format!("failed to reach generation service: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RenderError::Submit(format!("HTTP {status}: {body}")));
        }

        let prediction: PredictionResponse = response
            .json()
            .await
            .map_err(|e| RenderError::Submit(format!("malformed submit response: {e}")))?;

        tracing::debug!(model, prediction_id = %prediction.id, "submitted generation");
        Ok(SubmitReceipt {
            external_job_id: prediction.id,
            status: ExternalStatus::from_provider(&prediction.status),
            output: prediction.output,
        })
    }

    async fn poll(&self, external_job_id: &str) -> Result<PollSnapshot, RenderError> {
        let endpoint = self.endpoint(&format!("v1/predictions/{external_job_id}"))?;

        let response = self
            .client
            .get(endpoint)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| RenderError::Poll(format!("failed to reach generation service: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RenderError::Poll(format!("HTTP {status}: {body}")));
        }

        let prediction: PredictionResponse = response
            .json()
            .await
            .map_err(|e| RenderError::Poll(format!("malformed poll response: {e}")))?;

        let progress = estimate_progress(
            prediction.logs.as_deref(),
            prediction.created_at,
            Utc::now(),
        );
        Ok(PollSnapshot {
            external_job_id: prediction.id,
            status: ExternalStatus::from_provider(&prediction.status),
            output: prediction.output,
            error: prediction.error,
            progress,
        })
    }

    async fn await_terminal(&self, external_job_id: &str) -> Result<PollSnapshot, RenderError> {
        let deadline = tokio::time::Instant::now() + self.poll_deadline;
        loop {
            tokio::time::sleep(self.poll_interval).await;
            if tokio::time::Instant::now() >= deadline {
                return Err(RenderError::Timeout(self.poll_deadline.as_secs()));
            }
            let snapshot = self.poll(external_job_id).await?;
            if snapshot.status.is_terminal() {
                return Ok(snapshot);
            }
        }
    }
}

/// Best-effort completion estimate: the last percentage the provider logged
/// (capped at 95), otherwise an elapsed-time guess against a nominal 25s run
/// (capped at 90)
fn estimate_progress(
    logs: Option<&str>,
    created_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<u8> {
    if let Some(logs) = logs {
        if let Some(last) = PERCENT_RE
            .captures_iter(logs)
            .filter_map(|c| c[1].parse::<u32>().ok())
            .last()
        {
            return Some(last.min(95) as u8);
        }
    }
    let created_at = created_at?;
    let elapsed = (now - created_at).num_milliseconds().max(0) as f64 / 1000.0;
    Some(((elapsed / 25.0 * 100.0).round() as u32).min(90) as u8)
}
