//! Deterministic local summary used when text generation is unavailable.

use crate::findings::EngineOutput;
use crate::model::EngineDefinition;
use serde_json::Value;

/// Build a short description from whichever well-known fields are present,
/// regardless of the engine's category.
///
/// Never returns an empty string.
pub fn fallback_summary(engine: &EngineDefinition, data: &Value) -> String {
    let output = EngineOutput::parse(engine.category, data);
    let mut parts: Vec<String> = Vec::new();

    if let Some(f) = output.findings() {
        if let Some(model) = f.best_model.as_deref() {
            parts.push(format!("best model {model}"));
        }
        if let Some(acc) = f.accuracy {
            parts.push(format!("accuracy {}", percent(acc)));
        }
        if let Some(cv) = f.cv_score {
            parts.push(format!("CV score {cv:.3}"));
        }
        if let Some(n) = f.n_clusters {
            parts.push(format!("{n} clusters identified"));
        }
        if let Some(n) = f.anomaly_count {
            parts.push(format!("{n} anomalies detected"));
        }
        if let Some(rev) = f.total_revenue {
            parts.push(format!("total revenue {rev:.2}"));
        }
        if let Some(cost) = f.total_cost {
            parts.push(format!("total cost {cost:.2}"));
        }
        if let Some(roi) = f.roi {
            parts.push(format!("ROI {}", percent(roi)));
        }
        if !f.recommendations.is_empty() {
            parts.push(format!("{} recommendations", f.recommendations.len()));
        }
        if parts.is_empty() && !f.other_keys.is_empty() {
            parts.push(returned_fields(&f.other_keys));
        }
    }

    let mut out = if parts.is_empty() {
        format!("{} analysis completed.", engine.display_name)
    } else {
        format!("{} analysis completed: {}.", engine.display_name, parts.join(", "))
    };
    if let Some(insight) = output.first_insight() {
        out.push_str(" Key insight: ");
        out.push_str(&insight);
    }
    out
}

fn returned_fields(keys: &[String]) -> String {
    const SHOWN: usize = 3;
    let mut s = format!("returned {}", keys[..keys.len().min(SHOWN)].join(", "));
    if keys.len() > SHOWN {
        s.push_str(&format!(" and {} more fields", keys.len() - SHOWN));
    }
    s
}

/// Ratios in [0, 1] are shown as percentages; larger values are assumed to be
/// percentages already.
fn percent(v: f64) -> String {
    if (0.0..=1.0).contains(&v) {
        format!("{:.1}%", v * 100.0)
    } else {
        format!("{v:.1}%")
    }
}
