use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub base_url: String,
    pub user_agent: String,
    #[serde(with = "humantime_serde")]
    pub engine_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub summary_timeout: Duration,
    pub summary_retries: u32,
    #[serde(with = "humantime_serde")]
    pub summary_backoff: Duration,
    pub summary_max_tokens: u32,
    /// Pause between engine steps so presentation layers can catch up.
    #[serde(with = "humantime_serde")]
    pub step_delay: Duration,
}

/// Column selection and flags forwarded to every engine call of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineOptions {
    pub target_column: Option<String>,
    pub features: Option<Vec<String>>,
    pub use_extra_feature: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Ml,
    Financial,
    Advanced,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Ml => "ml",
            Category::Financial => "financial",
            Category::Advanced => "advanced",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineDefinition {
    pub name: &'static str,
    pub display_name: &'static str,
    pub icon: &'static str,
    pub category: Category,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Error,
}

/// Terminal outcome of one engine step, as stored in the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineResult {
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(
        default,
        rename = "gemmaSummary",
        skip_serializing_if = "Option::is_none"
    )]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock time of the engine call in milliseconds.
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_size: Option<usize>,
}

impl EngineResult {
    pub fn success(data: serde_json::Value, summary: String, duration_ms: u64) -> Self {
        let data_size = serde_json::to_string(&data).map(|s| s.len()).ok();
        Self {
            status: ResultStatus::Success,
            data: Some(data),
            summary: Some(summary),
            error: None,
            duration_ms,
            data_size,
        }
    }

    pub fn failure(error: String, duration_ms: u64) -> Self {
        Self {
            status: ResultStatus::Error,
            data: None,
            summary: None,
            error: Some(error),
            duration_ms,
            data_size: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub message: String,
    pub timestamp: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, message: impl Into<String>) -> Self {
        Self {
            role,
            message: message.into(),
            timestamp: timestamp_utc(),
        }
    }
}

/// Orchestration record for one full run over one uploaded dataset.
///
/// This is also the persisted checkpoint format, so field names follow the
/// camelCase shape the dashboard stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSession {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub stopped_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub completed_engines: Vec<String>,
    #[serde(default)]
    pub pending_engines: Vec<String>,
    #[serde(default)]
    pub results: BTreeMap<String, EngineResult>,
    #[serde(default)]
    pub chats: BTreeMap<String, Vec<ChatMessage>>,
    #[serde(default)]
    pub current_engine_index: usize,
}

impl AnalysisSession {
    pub fn is_completed(&self, engine: &str) -> bool {
        self.completed_engines.iter().any(|e| e == engine)
    }

    pub fn success_count(&self) -> usize {
        self.results.values().filter(|r| r.is_success()).count()
    }

    pub fn error_count(&self) -> usize {
        self.results.values().filter(|r| !r.is_success()).count()
    }
}

/// Result of uploading a dataset; the session filename is checked against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadState {
    pub filename: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub row_count: Option<u64>,
}

/// Aggregate counts reported when a run reaches the end of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub success: usize,
    pub error: usize,
    pub total: usize,
    /// Wall-clock time of this run in milliseconds.
    #[serde(rename = "totalTime")]
    pub total_time_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Lifecycle notifications emitted by the runner and consumed by UI/CLI layers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunnerEvent {
    Progress {
        completed: usize,
        total: usize,
        engine: &'static str,
    },
    EngineStarted {
        engine: EngineDefinition,
        index: usize,
    },
    EngineCompleted {
        engine: EngineDefinition,
        // Boxed to keep the enum small; results carry the whole engine body.
        result: Box<EngineResult>,
        duration_ms: u64,
    },
    EngineFailed {
        engine: EngineDefinition,
        error: String,
        duration_ms: u64,
    },
    Paused {
        index: usize,
    },
    AllCompleted {
        stats: RunStats,
    },
    Log {
        message: String,
        level: LogLevel,
        duration_ms: Option<u64>,
    },
}

/// Current time as an RFC 3339 string.
pub fn timestamp_utc() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_result_serializes_dashboard_field_names() {
        let r = EngineResult::success(serde_json::json!({"accuracy": 0.9}), "ok".into(), 120);
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["status"], "success");
        assert_eq!(v["gemmaSummary"], "ok");
        assert_eq!(v["duration"], 120);
        assert_eq!(v["dataSize"], 16);
        assert!(v.get("error").is_none());
    }

    #[test]
    fn completion_event_uses_stats_field_names() {
        let ev = RunnerEvent::AllCompleted {
            stats: RunStats {
                success: 21,
                error: 1,
                total: 22,
                total_time_ms: 4500,
            },
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["event"], "all_completed");
        assert_eq!(
            v["stats"],
            serde_json::json!({"success": 21, "error": 1, "total": 22, "totalTime": 4500})
        );
    }

    #[test]
    fn session_loads_from_partial_record() {
        let raw = r#"{"filename":"sales.csv","status":"paused","currentEngineIndex":3}"#;
        let s: AnalysisSession = serde_json::from_str(raw).unwrap();
        assert_eq!(s.status, SessionStatus::Paused);
        assert_eq!(s.current_engine_index, 3);
        assert!(s.results.is_empty());
    }
}
