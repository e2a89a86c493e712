use super::NexusClient;
use crate::error::InvokeError;
use crate::model::{EngineDefinition, EngineOptions};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// One attempt, one engine, one round trip. Implementations never retry.
#[async_trait]
pub trait EngineInvoker: Send + Sync {
    async fn invoke(
        &self,
        engine: &EngineDefinition,
        filename: &str,
        options: &EngineOptions,
    ) -> Result<Value, InvokeError>;
}

#[derive(Serialize)]
struct EngineRequest<'a> {
    filename: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_column: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    features: Option<&'a [String]>,
    use_extra_feature: bool,
}

#[async_trait]
impl EngineInvoker for NexusClient {
    async fn invoke(
        &self,
        engine: &EngineDefinition,
        filename: &str,
        options: &EngineOptions,
    ) -> Result<Value, InvokeError> {
        let body = EngineRequest {
            filename,
            target_column: options.target_column.as_deref(),
            features: options.features.as_deref(),
            use_extra_feature: options.use_extra_feature,
        };
        let timeout = self.engine_timeout;
        let url = self.url(&format!("/api/analytics/run-engine/{}", engine.name));

        let resp = self
            .http
            .post(url)
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| InvokeError::from_reqwest(e, timeout))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(InvokeError::Status(status.as_u16()));
        }

        let text = resp
            .text()
            .await
            .map_err(|e| InvokeError::from_reqwest(e, timeout))?;
        let value: Value =
            serde_json::from_str(&text).map_err(|e| InvokeError::Decode(e.to_string()))?;

        if let Some(msg) = reported_error(&value) {
            return Err(InvokeError::EngineReported(msg));
        }
        Ok(value)
    }
}

/// Extract an engine-reported failure from a 2xx body.
fn reported_error(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
