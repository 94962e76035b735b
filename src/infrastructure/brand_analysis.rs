//! HTTP client for the external brand-analysis LLM service
//!
//! One messages-API call turns a brand brief (+ optional logo image) into a
//! generation prompt. Every failure path is recoverable: callers fall back to
//! the brief's deterministic default prompt.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use url::Url;

use crate::pipeline::{BrandAnalyzer, BrandBrief, RenderError};

/// Hard ceiling on the response size (token budget)
const MAX_RESPONSE_TOKENS: u32 = 500;

const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Messages-API brand analyzer
pub struct HttpBrandAnalyzer {
    client: Client,
    base_url: Url,
    api_key: String,
    model: String,
}

impl HttpBrandAnalyzer {
    pub fn new(base_url: Url, api_key: impl Into<String>, model: impl Into<String>) -> Self {
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
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn instruction(brief: &BrandBrief) -> String {
        let colors = if brief.brand_colors.is_empty() {
            String::new()
        } else {
            format!("Brand colors: {}. ", brief.brand_colors.join(", "))
        };
        let company = if brief.company_name.is_empty() {
            "Modern Business"
        } else {
            &brief.company_name
        };
        format!(
            "You are a vehicle wrap design director. Create a generation prompt \
             for a vehicle wrap design.\n\
             Company: {company}. Industry: {industry}.\n\
             {colors}Style notes: {notes}.\n\
             Generate a detailed prompt (under 300 words) for a flat lay graphic design.\n\
             Include: color palette, graphic elements, typography direction, patterns, visual style.\n\
             Return ONLY the prompt text.",
            industry = brief.industry.as_deref().unwrap_or("General"),
            notes = brief.style_notes.as_deref().unwrap_or("Bold, professional"),
        )
    }
}

#[async_trait]
impl BrandAnalyzer for HttpBrandAnalyzer {
    async fn compose_prompt(&self, brief: &BrandBrief) -> Result<String, RenderError> {
        let endpoint = self
            .base_url
            .join("v1/messages")
            .map_err(|e| RenderError::Analysis(format!("invalid endpoint: {e}")))?;

        // The logo, when present, rides along as an image block
        let content = match &brief.logo_url {
            Some(logo_url) => json!([
                { "type": "image", "source": { "type": "url", "url": logo_url } },
                { "type": "text", "text": Self::instruction(brief) },
            ]),
            None => json!(Self::instruction(brief)),
        };

        let response = self
            .client
            .post(endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&json!({
                "model": self.model,
                "max_tokens": MAX_RESPONSE_TOKENS,
                "messages": [{ "role": "user", "content": content }],
            }))
            .send()
            .await
            .map_err(|e| RenderError::Analysis(format!("failed to reach analysis service: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RenderError::Analysis(format!("HTTP {status}: {body}")));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| RenderError::Analysis(format!("malformed response: {e}")))?;

        let text = parsed
            .content
            .iter()
            .find_map(|block| match block {
                ContentBlock::Text { text } => Some(text.trim().to_string()),
                ContentBlock::Other => None,
            })
            .filter(|text| !text.is_empty())
            .ok_or_else(|| RenderError::Analysis("empty analysis response".to_string()))?;

        Ok(text)
    }
}
