//! Natural-language summaries of engine results.
//!
//! All requests to the text-generation backend go through one FIFO queue so
//! the (GPU-bound) backend never sees more than one request at a time. Each
//! request is retried with exponential backoff and, for engine summaries,
//! falls back to a locally built description.

mod fallback;

pub use fallback::fallback_summary;

use crate::api::{SummaryRequest, TextGenerator};
use crate::model::{ChatMessage, ChatRole, EngineDefinition, EngineResult, RunConfig};
use crate::retry::{retry_async, RetryConfig};
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Upper bound on how much of an engine body is pasted into a prompt.
const MAX_PROMPT_DATA_CHARS: usize = 3000;

pub struct SummaryGenerator {
    backend: Arc<dyn TextGenerator>,
    // One permit: tokio semaphores hand out permits in FIFO order.
    queue: Semaphore,
    retry: RetryConfig,
    timeout: Duration,
    max_tokens: u32,
}

impl SummaryGenerator {
    pub fn new(backend: Arc<dyn TextGenerator>, cfg: &RunConfig) -> Self {
        Self {
            backend,
            queue: Semaphore::new(1),
            retry: RetryConfig {
                max_retries: cfg.summary_retries,
                base_delay: cfg.summary_backoff,
                ..Default::default()
            },
            timeout: cfg.summary_timeout,
            max_tokens: cfg.summary_max_tokens,
        }
    }

    /// Queue one prompt and run it to completion, retries included.
    pub async fn request(&self, prompt: String, session_id: &str) -> Result<String> {
        let _permit = self.queue.acquire().await.context("summary queue closed")?;
        let req = SummaryRequest {
            message: prompt,
            max_tokens: self.max_tokens,
            session_id: session_id.to_string(),
        };
        let req = &req;
        let backend = &self.backend;
        let timeout = self.timeout;
        retry_async(&self.retry, "summary", move || async move {
            tokio::time::timeout(timeout, backend.generate(req))
                .await
                .map_err(|_| anyhow!("summary request timed out after {timeout:?}"))?
        })
        .await
    }

    /// Summary for a successful engine body. Never empty.
    pub async fn summarize(&self, engine: &EngineDefinition, data: &Value, session_id: &str) -> String {
        match self.request(summary_prompt(engine, data), session_id).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                tracing::info!(engine = engine.name, "empty summary; using local fallback");
                fallback_summary(engine, data)
            }
            Err(e) => {
                tracing::warn!(
                    engine = engine.name,
                    error = %format!("{e:#}"),
                    "summary generation failed; using local fallback"
                );
                fallback_summary(engine, data)
            }
        }
    }

    /// Answer a follow-up question about one engine's result.
    pub async fn answer(
        &self,
        engine: &EngineDefinition,
        result: &EngineResult,
        history: &[ChatMessage],
        question: &str,
        session_id: &str,
    ) -> Result<String> {
        let text = self
            .request(follow_up_prompt(engine, result, history, question), session_id)
            .await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(anyhow!("empty answer from text generation backend"));
        }
        Ok(text.to_string())
    }
}

fn truncated_json(data: &Value) -> String {
    let json = data.to_string();
    if json.chars().count() <= MAX_PROMPT_DATA_CHARS {
        return json;
    }
    let mut out: String = json.chars().take(MAX_PROMPT_DATA_CHARS).collect();
    out.push_str("…");
    out
}

fn summary_prompt(engine: &EngineDefinition, data: &Value) -> String {
    format!(
        "You are a data analyst. Summarize these {} results in 2-3 sentences for a business audience. \
         Mention the most important numbers.\n\nResults:\n{}",
        engine.display_name,
        truncated_json(data)
    )
}

fn follow_up_prompt(
    engine: &EngineDefinition,
    result: &EngineResult,
    history: &[ChatMessage],
    question: &str,
) -> String {
    let mut prompt = format!(
        "You are a data analyst answering questions about a {} analysis.\n\nResults:\n{}\n",
        engine.display_name,
        result.data.as_ref().map(truncated_json).unwrap_or_default()
    );
    if let Some(summary) = result.summary.as_deref() {
        prompt.push_str(&format!("\nSummary: {summary}\n"));
    }
    if !history.is_empty() {
        prompt.push_str("\nConversation so far:\n");
        for m in history {
            let who = match m.role {
                ChatRole::User => "User",
                ChatRole::Assistant => "Analyst",
            };
            prompt.push_str(&format!("{who}: {}\n", m.message));
        }
    }
    prompt.push_str(&format!("\nUser: {question}\nAnalyst:"));
    prompt
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::test_config;
    use crate::registry;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted backend: pops replies in order, repeating the last one.
    pub(crate) struct ScriptedBackend {
        replies: Mutex<Vec<Result<String, String>>>,
        pub calls: AtomicUsize,
        pub sessions: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedBackend {
        pub(crate) fn new(replies: Vec<Result<String, String>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
                sessions: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        pub(crate) fn always(reply: Result<&str, &str>) -> Self {
            Self::new(vec![reply.map(str::to_string).map_err(str::to_string)])
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedBackend {
        async fn generate(&self, req: &SummaryRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.sessions.lock().unwrap().push(req.session_id.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            let mut replies = self.replies.lock().unwrap();
            let reply = if replies.len() > 1 {
                replies.remove(0)
            } else {
                replies[0].clone()
            };
            reply.map_err(|e| anyhow!(e))
        }
    }

    fn generator(backend: Arc<ScriptedBackend>) -> SummaryGenerator {
        SummaryGenerator::new(backend, &test_config("http://unused"))
    }

    #[tokio::test]
    async fn remote_text_is_used_when_available() {
        let backend = Arc::new(ScriptedBackend::always(Ok("  Revenue grew 12%.  ")));
        let g = generator(backend.clone());
        let titan = registry::find("titan").unwrap();
        let s = g.summarize(titan, &serde_json::json!({}), "gpu_a").await;
        assert_eq!(s, "Revenue grew 12%.");
        assert_eq!(backend.sessions.lock().unwrap().as_slice(), ["gpu_a"]);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err("503".into()),
            Ok("Recovered.".into()),
        ]));
        let g = generator(backend.clone());
        let titan = registry::find("titan").unwrap();
        assert_eq!(g.summarize(titan, &serde_json::json!({}), "gpu").await, "Recovered.");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn three_failures_fall_back_to_local_summary() {
        let backend = Arc::new(ScriptedBackend::always(Err("down")));
        let g = generator(backend.clone());
        let titan = registry::find("titan").unwrap();
        let s = g
            .summarize(titan, &serde_json::json!({"best_model": "XGBoost"}), "gpu")
            .await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        assert_eq!(s, "Titan AutoML analysis completed: best model XGBoost.");
    }

    #[tokio::test]
    async fn empty_text_falls_back_without_retry() {
        let backend = Arc::new(ScriptedBackend::always(Ok("   ")));
        let g = generator(backend.clone());
        let anomaly = registry::find("anomaly").unwrap();
        let s = g
            .summarize(anomaly, &serde_json::json!({"anomaly_count": 7}), "gpu")
            .await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(s.contains("7 anomalies detected"));
    }

    #[tokio::test]
    async fn slow_backend_counts_as_failure() {
        let backend =
            Arc::new(ScriptedBackend::always(Ok("late")).with_delay(Duration::from_millis(200)));
        let mut cfg = test_config("http://unused");
        cfg.summary_timeout = Duration::from_millis(20);
        cfg.summary_retries = 0;
        let g = SummaryGenerator::new(backend, &cfg);
        let err = g.request("p".into(), "gpu").await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn queue_never_overlaps_requests() {
        let backend =
            Arc::new(ScriptedBackend::always(Ok("ok")).with_delay(Duration::from_millis(20)));
        let g = Arc::new(generator(backend.clone()));
        let mut handles = Vec::new();
        for i in 0..4 {
            let g = g.clone();
            handles.push(tokio::spawn(async move {
                g.request(format!("prompt {i}"), "gpu").await
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), "ok");
        }
        assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn follow_up_prompt_includes_history() {
        let titan = registry::find("titan").unwrap();
        let result = EngineResult::success(serde_json::json!({"accuracy": 0.9}), "Good fit.".into(), 3);
        let history = vec![
            ChatMessage::new(ChatRole::User, "Which model?"),
            ChatMessage::new(ChatRole::Assistant, "XGBoost."),
        ];
        let p = follow_up_prompt(titan, &result, &history, "Why?");
        assert!(p.contains("Summary: Good fit."));
        assert!(p.contains("User: Which model?\nAnalyst: XGBoost.\n"));
        assert!(p.ends_with("User: Why?\nAnalyst:"));
    }
}
