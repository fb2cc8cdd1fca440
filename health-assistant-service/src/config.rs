use anyhow::{Context as _, anyhow};
use std::path::PathBuf;
use triage_flow::PipelineConfig;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MODEL: &str = "google/gemini-flash-1.5";

/// Process configuration read from the environment
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub openrouter_api_key: String,
    pub google_maps_api_key: Option<String>,
    pub firecrawl_api_key: Option<String>,
    pub port: u16,
    pub text_model: String,
    pub vision_model: String,
    /// YAML file with [`PipelineConfig`] overrides
    pub pipeline_config: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let openrouter_api_key =
            get("OPENROUTER_API_KEY").ok_or_else(|| anyhow!("OPENROUTER_API_KEY not set"))?;

        let port = match get("PORT") {
            Some(port) => port
                .trim()
                .parse::<u16>()
                .with_context(|| format!("invalid PORT value: {port}"))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            openrouter_api_key,
            google_maps_api_key: get("GOOGLE_MAPS_API_KEY"),
            firecrawl_api_key: get("FIRECRAWL_API_KEY"),
            port,
            text_model: get("TEXT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            vision_model: get("VISION_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            pipeline_config: get("PIPELINE_CONFIG").map(PathBuf::from),
        })
    }

    pub fn pipeline(&self) -> anyhow::Result<PipelineConfig> {
        match &self.pipeline_config {
            Some(path) => Ok(PipelineConfig::from_yaml_file(path)?),
            None => Ok(PipelineConfig::default()),
        }
    }
}
