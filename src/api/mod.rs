//! HTTP client for the NexusAI backend.
//!
//! One [`NexusClient`] serves the three endpoints the runner needs: dataset
//! upload, engine invocation and text generation.

mod chat;
mod invoke;
mod upload;

pub use chat::{SummaryRequest, TextGenerator};
pub use invoke::EngineInvoker;

use crate::model::RunConfig;
use anyhow::{Context, Result};
use std::time::Duration;

#[derive(Clone)]
pub struct NexusClient {
    pub(crate) http: reqwest::Client,
    base_url: String,
    engine_timeout: Duration,
}

impl NexusClient {
    pub fn new(cfg: &RunConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            engine_timeout: cfg.engine_timeout,
        })
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[cfg(test)]
pub(crate) fn test_config(base_url: &str) -> RunConfig {
    RunConfig {
        base_url: base_url.to_string(),
        user_agent: "nexus-runner-test".into(),
        engine_timeout: Duration::from_secs(5),
        summary_timeout: Duration::from_secs(5),
        summary_retries: 2,
        summary_backoff: Duration::from_millis(1),
        summary_max_tokens: 64,
        step_delay: Duration::ZERO,
    }
}
