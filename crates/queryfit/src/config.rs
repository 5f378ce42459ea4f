use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use queryfit_llm::LlmProvider;

pub const DEFAULT_MIN_IMPROVE: f32 = 0.0003;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_OUTPUT_DIR: &str = "data/output";

/// Explicit configuration handed to the batch runner and refinement loop
/// at construction time. No process-wide state: tests build these inline.
#[derive(Debug, Clone)]
pub struct RefineConfig {
    pub provider: LlmProvider,
    pub model: String,
    /// Minimum fractional similarity gain required to accept a candidate
    /// outright (0.0003 = 0.03%).
    pub min_improve: f32,
    /// Generation-call budget per row.
    pub max_attempts: u32,
    /// Optional pause between generation calls, for rate-limited backends.
    pub llm_delay_ms: u64,
    pub output_dir: PathBuf,
}

impl RefineConfig {
    pub fn from_env() -> Result<Self> {
        let provider_name = env::var("QUERYFIT_PROVIDER").unwrap_or_else(|_| "ollama".to_string());
        let provider = LlmProvider::from_str(&provider_name)
            .ok_or_else(|| anyhow!(format!("unknown provider {provider_name}")))?;
        let model =
            env::var("QUERYFIT_MODEL").unwrap_or_else(|_| default_model(provider).to_string());
        let min_improve = env::var("QUERYFIT_MIN_IMPROVE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MIN_IMPROVE);
        let max_attempts = env::var("QUERYFIT_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);
        let llm_delay_ms = env::var("QUERYFIT_THROTTLE_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let output_dir = env::var("QUERYFIT_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_OUTPUT_DIR));
        Ok(Self {
            provider,
            model,
            min_improve,
            max_attempts,
            llm_delay_ms,
            output_dir,
        })
    }
}

fn default_model(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::Ollama => "gemma3:4b",
        LlmProvider::OpenAi => "gpt-4.1-mini",
        LlmProvider::Local => "local",
    }
}

/// YAML run config, for `queryfit run --config queryfit.yaml`.
#[derive(Debug, Deserialize)]
pub struct RunConfig {
    pub input: String,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub min_improve: Option<f32>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub throttle_ms: Option<u64>,
}

impl RefineConfig {
    /// Applies non-empty overrides on top of this config. CLI flags and
    /// YAML values both funnel through here.
    pub fn with_overrides(
        mut self,
        min_improve: Option<f32>,
        max_attempts: Option<u32>,
        provider: Option<&str>,
        model: Option<&str>,
    ) -> Result<Self> {
        if let Some(value) = min_improve {
            self.min_improve = value;
        }
        if let Some(value) = max_attempts {
            self.max_attempts = value;
        }
        if let Some(name) = provider {
            self.provider = LlmProvider::from_str(name)
                .ok_or_else(|| anyhow!(format!("unknown provider {name}")))?;
            if model.is_none() {
                self.model = default_model(self.provider).to_string();
            }
        }
        if let Some(name) = model {
            self.model = name.to_string();
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> RefineConfig {
        RefineConfig {
            provider: LlmProvider::Local,
            model: "local".into(),
            min_improve: DEFAULT_MIN_IMPROVE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            llm_delay_ms: 0,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }

    #[test]
    fn overrides_apply_in_order() {
        let cfg = base()
            .with_overrides(Some(0.01), Some(5), Some("ollama"), Some("llama3"))
            .unwrap();
        assert_eq!(cfg.min_improve, 0.01);
        assert_eq!(cfg.max_attempts, 5);
        assert_eq!(cfg.provider, LlmProvider::Ollama);
        assert_eq!(cfg.model, "llama3");
    }

    #[test]
    fn provider_switch_resets_model_default() {
        let cfg = base()
            .with_overrides(None, None, Some("ollama"), None)
            .unwrap();
        assert_eq!(cfg.model, "gemma3:4b");
    }

    #[test]
    fn unknown_provider_is_rejected() {
        assert!(base()
            .with_overrides(None, None, Some("mystery"), None)
            .is_err());
    }

    #[test]
    fn run_config_parses_minimal_yaml() {
        let cfg: RunConfig = serde_yaml::from_str("input: data/top10.csv\n").unwrap();
        assert_eq!(cfg.input, "data/top10.csv");
        assert!(cfg.output.is_none());
    }
}
