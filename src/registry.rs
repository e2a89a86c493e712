//! Compiled-in registry of analysis engines.
//!
//! Order matters: it is the execution order of a run and the index space of
//! the session cursor.

use crate::model::{Category, EngineDefinition};

const fn def(
    name: &'static str,
    display_name: &'static str,
    icon: &'static str,
    category: Category,
) -> EngineDefinition {
    EngineDefinition {
        name,
        display_name,
        icon,
        category,
    }
}

pub const ENGINES: [EngineDefinition; 22] = [
    def("titan", "Titan AutoML", "🚀", Category::Ml),
    def("predictive", "Predictive Analytics", "🔮", Category::Ml),
    def("clustering", "Clustering", "🧩", Category::Ml),
    def("anomaly", "Anomaly Detection", "🚨", Category::Ml),
    def("statistical", "Statistical Analysis", "📊", Category::Ml),
    def("trend", "Trend Analysis", "📈", Category::Ml),
    def("graphs", "Graph Insights", "🕸️", Category::Ml),
    def("chaos", "Chaos Engine", "🌀", Category::Ml),
    def("oracle", "Oracle Causality", "🏛️", Category::Ml),
    def("scout", "Drift Scout", "🔭", Category::Ml),
    def("chronos", "Chronos Forecasting", "⏳", Category::Ml),
    def("cost", "Cost Optimization", "💰", Category::Financial),
    def("roi", "ROI Prediction", "💹", Category::Financial),
    def("spend_patterns", "Spend Patterns", "🧾", Category::Financial),
    def("budget_variance", "Budget Variance", "📉", Category::Financial),
    def("profit_margin", "Profit Margin", "💵", Category::Financial),
    def(
        "revenue_forecasting",
        "Revenue Forecasting",
        "🏦",
        Category::Financial,
    ),
    def("customer_ltv", "Customer LTV", "👥", Category::Advanced),
    def(
        "inventory_optimization",
        "Inventory Optimization",
        "📦",
        Category::Advanced,
    ),
    def("pricing_strategy", "Pricing Strategy", "🏷️", Category::Advanced),
    def("market_basket", "Market Basket", "🛒", Category::Advanced),
    def(
        "resource_utilization",
        "Resource Utilization",
        "⚙️",
        Category::Advanced,
    ),
];

pub fn engine_names() -> Vec<&'static str> {
    ENGINES.iter().map(|e| e.name).collect()
}

pub fn find(name: &str) -> Option<&'static EngineDefinition> {
    ENGINES.iter().find(|e| e.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_are_unique() {
        let names: HashSet<_> = ENGINES.iter().map(|e| e.name).collect();
        assert_eq!(names.len(), ENGINES.len());
    }

    #[test]
    fn order_starts_with_titan_then_predictive() {
        assert_eq!(ENGINES[0].name, "titan");
        assert_eq!(ENGINES[1].name, "predictive");
        assert_eq!(find("market_basket").map(|e| e.category), Some(Category::Advanced));
        assert!(find("nope").is_none());
    }
}
