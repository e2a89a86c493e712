//! Text report builder for CLI output.
//!
//! Formats a session (finished or not) as human-readable lines, one per
//! recorded engine in registry order.

use crate::metrics;
use crate::model::{AnalysisSession, RunStats, SessionStatus};
use crate::registry::ENGINES;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

pub(crate) fn build_text_summary(session: &AnalysisSession, stats: Option<&RunStats>) -> TextSummary {
    let mut lines = Vec::new();

    lines.push(format!("Dataset: {}", session.filename));
    lines.push(format!(
        "Session: {} ({})",
        session.id,
        status_label(session.status)
    ));
    lines.push(format!(
        "Engines: {} succeeded, {} failed, {} pending of {}",
        session.success_count(),
        session.error_count(),
        session.pending_engines.len(),
        ENGINES.len()
    ));
    if session.status == SessionStatus::Paused {
        lines.push(format!(
            "Paused before engine {}/{}",
            session.current_engine_index + 1,
            ENGINES.len()
        ));
    }
    if let Some(stats) = stats {
        lines.push(format!(
            "Total time: {:.1}s",
            stats.total_time_ms as f64 / 1000.0
        ));
    }
    if let Some((mean, median, p25, p75)) = metrics::duration_metrics(session) {
        lines.push(format!(
            "Engine time: avg {mean:.2}s med {median:.2}s p25 {p25:.2}s p75 {p75:.2}s"
        ));
    }

    let recorded: Vec<_> = ENGINES
        .iter()
        .filter_map(|e| session.results.get(e.name).map(|r| (e, r)))
        .collect();
    if !recorded.is_empty() {
        lines.push(String::new());
    }
    for (engine, result) in recorded {
        let secs = result.duration_ms as f64 / 1000.0;
        let (mark, detail) = if result.is_success() {
            ("✓", result.summary.as_deref().unwrap_or(""))
        } else {
            ("✗", result.error.as_deref().unwrap_or("unknown error"))
        };
        lines.push(format!(
            "{mark} {:<24} {secs:>6.1}s  {detail}",
            engine.display_name
        ));
        if let Some(chat) = session.chats.get(engine.name) {
            if !chat.is_empty() {
                lines.push(format!("    ({} follow-up messages)", chat.len()));
            }
        }
    }

    TextSummary { lines }
}

fn status_label(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Idle => "idle",
        SessionStatus::Running => "running",
        SessionStatus::Paused => "paused",
        SessionStatus::Completed => "completed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EngineResult;

    #[test]
    fn report_lists_engines_in_registry_order() {
        let mut s = AnalysisSession {
            id: "session_1".into(),
            filename: "sales.csv".into(),
            status: SessionStatus::Paused,
            current_engine_index: 2,
            pending_engines: ENGINES[2..].iter().map(|e| e.name.to_string()).collect(),
            ..Default::default()
        };
        s.results
            .insert("predictive".into(), EngineResult::failure("HTTP 500".into(), 250));
        s.results.insert(
            "titan".into(),
            EngineResult::success(serde_json::json!({}), "Strong fit.".into(), 1250),
        );

        let lines = build_text_summary(&s, None).lines;
        assert_eq!(lines[0], "Dataset: sales.csv");
        assert_eq!(lines[1], "Session: session_1 (paused)");
        assert_eq!(lines[2], "Engines: 1 succeeded, 1 failed, 20 pending of 22");
        assert_eq!(lines[3], "Paused before engine 3/22");
        let titan = lines.iter().position(|l| l.contains("Titan AutoML")).unwrap();
        let predictive = lines.iter().position(|l| l.contains("HTTP 500")).unwrap();
        assert!(titan < predictive);
        assert!(lines[titan].starts_with("✓") && lines[titan].ends_with("Strong fit."));
    }
}
