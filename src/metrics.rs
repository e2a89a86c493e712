use crate::model::{AnalysisSession, RunStats};
use std::time::Duration;

/// Compute metrics (mean, median, 25th percentile, 75th percentile) from samples
pub fn compute_metrics(samples: &[f64]) -> Option<(f64, f64, f64, f64)> {
    if samples.len() < 2 {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    let median = sorted[n / 2];
    let p25 = sorted[n / 4];
    let p75 = sorted[3 * n / 4];
    Some((mean, median, p25, p75))
}

/// Engine call durations in seconds (mean, median, p25, p75) over recorded results.
pub fn duration_metrics(session: &AnalysisSession) -> Option<(f64, f64, f64, f64)> {
    let secs: Vec<f64> = session
        .results
        .values()
        .map(|r| r.duration_ms as f64 / 1000.0)
        .collect();
    compute_metrics(&secs)
}

/// Aggregate counts over everything recorded in the session, including
/// results carried over from before a resume.
pub fn run_stats(session: &AnalysisSession, total: usize, elapsed: Duration) -> RunStats {
    RunStats {
        success: session.success_count(),
        error: session.error_count(),
        total,
        total_time_ms: elapsed.as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EngineResult;

    #[test]
    fn metrics_need_two_samples() {
        assert_eq!(compute_metrics(&[1.0]), None);
        let (mean, median, p25, p75) = compute_metrics(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!((mean, median, p25, p75), (2.5, 3.0, 2.0, 4.0));
    }

    #[test]
    fn stats_count_errors_separately() {
        let mut s = AnalysisSession::default();
        s.results.insert(
            "titan".into(),
            EngineResult::success(serde_json::json!({}), "ok".into(), 1500),
        );
        s.results
            .insert("predictive".into(), EngineResult::failure("HTTP 500".into(), 500));
        let stats = run_stats(&s, 22, Duration::from_secs(3));
        assert_eq!(
            stats,
            RunStats {
                success: 1,
                error: 1,
                total: 22,
                total_time_ms: 3000
            }
        );
        let (mean, ..) = duration_metrics(&s).unwrap();
        assert_eq!(mean, 1.0);
    }
}
