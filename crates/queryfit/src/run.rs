use std::fs;

use anyhow::{Context, Result};
use serde_yaml::from_str;

use crate::config::{RefineConfig, RunConfig};
use crate::refine;

pub fn run_from_config(path: &str) -> Result<()> {
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read config {path}"))?;
    let run: RunConfig = from_str(&raw).context("invalid queryfit config")?;
    let cfg = build_config(&run)?;
    refine::execute(cfg, &run.input, run.output.as_deref())
}

fn build_config(run: &RunConfig) -> Result<RefineConfig> {
    let mut cfg = RefineConfig::from_env()?.with_overrides(
        run.min_improve,
        run.max_attempts,
        run.provider.as_deref(),
        run.model.as_deref(),
    )?;
    if let Some(delay) = run.throttle_ms {
        cfg.llm_delay_ms = delay;
    }
    Ok(cfg)
}
