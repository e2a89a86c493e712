use super::NexusClient;
use crate::error::UploadError;
use crate::model::UploadState;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize)]
struct UploadResponse {
    filename: String,
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    row_count: Option<u64>,
}

impl NexusClient {
    /// Upload a dataset and return the column metadata the backend detected.
    pub async fn upload_file(&self, path: &Path) -> Result<UploadState, UploadError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| UploadError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string());

        let form = Form::new().part("file", Part::bytes(bytes).file_name(name));
        let resp = self
            .http
            .post(self.url("/api/upload"))
            .multipart(form)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(UploadError::Status(status.as_u16()));
        }
        let body: UploadResponse = resp.json().await?;
        tracing::info!(
            filename = %body.filename,
            columns = body.columns.len(),
            rows = ?body.row_count,
            "dataset uploaded"
        );
        Ok(UploadState {
            filename: body.filename,
            columns: body.columns,
            row_count: body.row_count,
        })
    }
}
