//! Post-run processing utilities.
//!
//! Handles exports once a run completes.

use crate::model::AnalysisSession;
use crate::storage;
use std::path::PathBuf;

/// Where to export a finished session, if anywhere.
#[derive(Debug, Clone, Default)]
pub(crate) struct ExportTargets {
    pub json: Option<PathBuf>,
    pub csv: Option<PathBuf>,
}

/// Export a finished session. Export failures are reported, not raised, so a
/// bad path never hides the run's results.
pub(crate) fn process_run_completion(targets: &ExportTargets, session: &AnalysisSession) -> Vec<String> {
    let mut export_messages = Vec::new();
    if let Some(export_path) = targets.json.as_deref() {
        match storage::export_json(export_path, session) {
            Ok(_) => export_messages.push(format!("Exported JSON: {}", export_path.display())),
            Err(e) => export_messages.push(format!("Export JSON failed: {e:#}")),
        }
    }
    if let Some(export_path) = targets.csv.as_deref() {
        match storage::export_csv(export_path, session) {
            Ok(_) => export_messages.push(format!("Exported CSV: {}", export_path.display())),
            Err(e) => export_messages.push(format!("Export CSV failed: {e:#}")),
        }
    }
    export_messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exports_both_formats_and_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        let targets = ExportTargets {
            json: Some(dir.path().join("session.json")),
            csv: Some(dir.path().join("missing-dir").join("results.csv")),
        };
        let session = AnalysisSession {
            filename: "sales.csv".into(),
            ..Default::default()
        };

        let messages = process_run_completion(&targets, &session);
        assert!(messages[0].starts_with("Exported JSON:"));
        assert!(messages[1].starts_with("Export CSV failed:"));

        let saved: AnalysisSession =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("session.json")).unwrap())
                .unwrap();
        assert_eq!(saved.filename, "sales.csv");
    }
}
