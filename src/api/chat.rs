use super::NexusClient;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Prompt sent to the text-generation backend.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryRequest {
    pub message: String,
    pub max_tokens: u32,
    /// GPU session token; keeps the model pinned for a whole run.
    pub session_id: String,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Single attempt. Returns the generated text, possibly empty.
    async fn generate(&self, req: &SummaryRequest) -> Result<String>;
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    response: Option<String>,
}

#[async_trait]
impl TextGenerator for NexusClient {
    async fn generate(&self, req: &SummaryRequest) -> Result<String> {
        let resp = self
            .http
            .post(self.url("/api/chat"))
            .json(req)
            .send()
            .await
            .context("chat request failed")?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("chat backend returned HTTP {}", status.as_u16()));
        }
        let body: ChatResponse = resp.json().await.context("invalid chat response")?;
        Ok(body.message.or(body.response).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_config;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn sends_session_token_and_reads_either_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(serde_json::json!({"session_id": "gpu_1"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"response": "hi"})),
            )
            .mount(&server)
            .await;

        let client = NexusClient::new(&test_config(&server.uri())).unwrap();
        let text = client
            .generate(&SummaryRequest {
                message: "summarize".into(),
                max_tokens: 32,
                session_id: "gpu_1".into(),
            })
            .await
            .unwrap();
        assert_eq!(text, "hi");
    }

    #[tokio::test]
    async fn rate_limited_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = NexusClient::new(&test_config(&server.uri())).unwrap();
        let err = client
            .generate(&SummaryRequest {
                message: "summarize".into(),
                max_tokens: 32,
                session_id: "gpu_1".into(),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("429"));
    }
}
