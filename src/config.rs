//! Runtime configuration for the render pipeline

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::pipeline::RenderError;

fn default_generation_url() -> Url {
    Url::parse("https://api.replicate.com/").expect("valid default URL")
}

fn default_analysis_url() -> Url {
    Url::parse("https://api.anthropic.com/").expect("valid default URL")
}

fn default_analysis_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_bucket() -> String {
    "project-files".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("wrapflow.db")
}

/// External generation service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationServiceConfig {
    #[serde(default = "default_generation_url")]
    pub base_url: Url,
    pub api_token: String,
}

/// Brand-analysis LLM service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisServiceConfig {
    #[serde(default = "default_analysis_url")]
    pub base_url: Url,
    pub api_key: String,
    #[serde(default = "default_analysis_model")]
    pub model: String,
}

/// Object-storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub base_url: Url,
    pub api_token: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
}

/// Top-level pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub generation: GenerationServiceConfig,
    pub analysis: AnalysisServiceConfig,
    pub storage: StorageConfig,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl PipelineConfig {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RenderError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_with_defaults() {
        let raw = serde_json::json!({
            "generation": { "api_token": "r8-token" },
            "analysis": { "api_key": "sk-key" },
            "storage": {
                "base_url": "https://proj.supabase.co/",
                "api_token": "service-role"
            }
        });
        let config: PipelineConfig = serde_json::from_value(raw).unwrap();
        assert_eq!(
            config.generation.base_url.as_str(),
            "https://api.replicate.com/"
        );
        assert_eq!(config.analysis.model, "claude-sonnet-4-5");
        assert_eq!(config.storage.bucket, "project-files");
        assert_eq!(config.database_path, PathBuf::from("wrapflow.db"));
    }
}
