//! Typed view over engine response bodies.
//!
//! Engine bodies have no fixed schema. Every well-known key is read on its
//! own, so a mistyped or missing key never hides the others, and the full key
//! set is read whatever the engine's category. Keys we do not know are listed
//! in [`Findings::other_keys`]. Bodies that are not JSON objects stay
//! [`EngineOutput::Opaque`].

use crate::model::Category;
use serde_json::{Map, Value};

const BEST_MODEL: &[&str] = &["best_model", "model"];
const ACCURACY: &[&str] = &["accuracy"];
const CV_SCORE: &[&str] = &["cv_score"];
const N_CLUSTERS: &[&str] = &["n_clusters", "cluster_count", "num_clusters", "clusters"];
const ANOMALY_COUNT: &[&str] = &["anomaly_count", "anomalies_detected", "num_anomalies", "anomalies"];
const TOTAL_REVENUE: &[&str] = &["total_revenue"];
const TOTAL_COST: &[&str] = &["total_cost"];
const ROI: &[&str] = &["roi"];
const RECOMMENDATIONS: &[&str] = &["recommendations"];
const INSIGHTS: &[&str] = &["insights", "key_insights"];

const KNOWN_KEYS: &[&[&str]] = &[
    BEST_MODEL,
    ACCURACY,
    CV_SCORE,
    N_CLUSTERS,
    ANOMALY_COUNT,
    TOTAL_REVENUE,
    TOTAL_COST,
    ROI,
    RECOMMENDATIONS,
    INSIGHTS,
];

/// Well-known fields of an engine body. Every field is independent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Findings {
    pub best_model: Option<String>,
    pub accuracy: Option<f64>,
    pub cv_score: Option<f64>,
    pub n_clusters: Option<u64>,
    pub anomaly_count: Option<u64>,
    pub total_revenue: Option<f64>,
    pub total_cost: Option<f64>,
    pub roi: Option<f64>,
    pub recommendations: Vec<String>,
    pub insights: Vec<String>,
    /// Top-level keys outside the well-known set, sorted.
    pub other_keys: Vec<String>,
}

impl Findings {
    pub fn from_object(body: &Map<String, Value>) -> Self {
        let mut other_keys: Vec<String> = body
            .keys()
            .filter(|k| !KNOWN_KEYS.iter().any(|names| names.contains(&k.as_str())))
            .cloned()
            .collect();
        other_keys.sort();

        Self {
            best_model: first(body, BEST_MODEL, text),
            accuracy: first(body, ACCURACY, number),
            cv_score: first(body, CV_SCORE, number),
            n_clusters: first(body, N_CLUSTERS, count),
            anomaly_count: first(body, ANOMALY_COUNT, count),
            total_revenue: first(body, TOTAL_REVENUE, number),
            total_cost: first(body, TOTAL_COST, number),
            roi: first(body, ROI, number),
            recommendations: first(body, RECOMMENDATIONS, texts).unwrap_or_default(),
            insights: first(body, INSIGHTS, texts).unwrap_or_default(),
            other_keys,
        }
    }
}

/// Category-tagged findings.
#[derive(Debug, Clone)]
pub enum EngineOutput {
    Ml(Findings),
    Financial(Findings),
    Advanced(Findings),
    Opaque(Value),
}

impl EngineOutput {
    pub fn parse(category: Category, body: &Value) -> Self {
        let Some(obj) = body.as_object() else {
            return EngineOutput::Opaque(body.clone());
        };
        let findings = Findings::from_object(obj);
        match category {
            Category::Ml => EngineOutput::Ml(findings),
            Category::Financial => EngineOutput::Financial(findings),
            Category::Advanced => EngineOutput::Advanced(findings),
        }
    }

    pub fn findings(&self) -> Option<&Findings> {
        match self {
            EngineOutput::Ml(f) | EngineOutput::Financial(f) | EngineOutput::Advanced(f) => Some(f),
            EngineOutput::Opaque(_) => None,
        }
    }

    /// First insight the engine reported. Advanced engines fall back to their
    /// first recommendation.
    pub fn first_insight(&self) -> Option<String> {
        let f = self.findings()?;
        let from_recommendations = match self {
            EngineOutput::Advanced(_) => f.recommendations.first(),
            _ => None,
        };
        f.insights.first().or(from_recommendations).cloned()
    }
}

fn first<T>(body: &Map<String, Value>, names: &[&str], read: fn(&Value) -> Option<T>) -> Option<T> {
    names.iter().find_map(|n| body.get(*n).and_then(read))
}

fn number(v: &Value) -> Option<f64> {
    let n: Option<f64> = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    };
    n.filter(|f| f.is_finite())
}

/// Whole counts. Integral floats are accepted and arrays count their items.
fn count(v: &Value) -> Option<u64> {
    if let Value::Array(items) = v {
        return Some(items.len() as u64);
    }
    if let Some(n) = v.as_u64() {
        return Some(n);
    }
    number(v)
        .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
        .map(|f| f as u64)
}

fn text(v: &Value) -> Option<String> {
    let s = match v {
        Value::String(s) => s.as_str(),
        Value::Object(o) => ["name", "text", "insight", "description", "message", "model"]
            .iter()
            .find_map(|k| o.get(*k).and_then(Value::as_str))?,
        _ => return None,
    };
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// A list of strings, a single string, or a list of objects with a text field.
fn texts(v: &Value) -> Option<Vec<String>> {
    match v {
        Value::Array(items) => Some(items.iter().filter_map(text).collect()),
        other => text(other).map(|t| vec![t]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_keys_are_listed() {
        let body = json!({"best_model": "RandomForest", "cluster_count": 4, "feature_importance": {"a": 0.5}, "auc": 0.8});
        let EngineOutput::Ml(f) = EngineOutput::parse(Category::Ml, &body) else {
            panic!("expected ml findings");
        };
        assert_eq!(f.best_model.as_deref(), Some("RandomForest"));
        assert_eq!(f.n_clusters, Some(4));
        assert_eq!(f.other_keys, vec!["auc".to_string(), "feature_importance".to_string()]);
    }

    #[test]
    fn one_mistyped_key_keeps_the_rest() {
        let body = json!({"accuracy": "high", "best_model": {"name": "XGBoost"}, "n_clusters": 3.0, "insights": ["Sales peak in Q4"]});
        let out = EngineOutput::parse(Category::Ml, &body);
        let f = out.findings().unwrap();
        assert_eq!(f.accuracy, None);
        assert_eq!(f.best_model.as_deref(), Some("XGBoost"));
        assert_eq!(f.n_clusters, Some(3));
        assert_eq!(out.first_insight().as_deref(), Some("Sales peak in Q4"));
    }

    #[test]
    fn keys_are_read_across_categories() {
        let body = json!({"total_revenue": 125000.0, "anomalies": [1, 2], "insights": "Segment A dominates"});
        let out = EngineOutput::parse(Category::Advanced, &body);
        let f = out.findings().unwrap();
        assert_eq!(f.total_revenue, Some(125000.0));
        assert_eq!(f.anomaly_count, Some(2));
        assert_eq!(f.insights, vec!["Segment A dominates".to_string()]);
    }

    #[test]
    fn insight_objects_and_recommendations() {
        let body = json!({"recommendations": [{"text": "Raise price on SKU 12"}]});
        let out = EngineOutput::parse(Category::Advanced, &body);
        assert_eq!(out.first_insight().as_deref(), Some("Raise price on SKU 12"));

        let ml = EngineOutput::parse(Category::Ml, &body);
        assert_eq!(ml.first_insight(), None);
    }

    #[test]
    fn non_object_body_is_opaque() {
        let out = EngineOutput::parse(Category::Financial, &json!([1, 2, 3]));
        assert!(matches!(out, EngineOutput::Opaque(_)));
        assert_eq!(out.first_insight(), None);
    }

    #[test]
    fn fractional_or_negative_counts_are_ignored() {
        let f = Findings::from_object(json!({"n_clusters": 2.5, "anomaly_count": -1}).as_object().unwrap());
        assert_eq!(f.n_clusters, None);
        assert_eq!(f.anomaly_count, None);
    }
}
