//! JSON-file durable store.
//!
//! One file per record: `submissions/<id>.json` and `reports/<id>.json`
//! under a root directory. Good enough for a single-device deployment;
//! the remote backend covers everything else.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use proctor_core::error::StoreError;
use proctor_core::model::{EvaluationReport, Submission};
use proctor_core::traits::SubmissionStore;

/// Durable store writing pretty-printed JSON files.
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn submission_path(&self, id: Uuid) -> PathBuf {
        self.root.join("submissions").join(format!("{id}.json"))
    }

    fn report_path(&self, id: Uuid) -> PathBuf {
        self.root.join("reports").join(format!("{id}.json"))
    }

    fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(value)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

#[async_trait]
impl SubmissionStore for JsonFileStore {
    async fn save_submission(&self, submission: &Submission) -> Result<(), StoreError> {
        Self::write_json(&self.submission_path(submission.submission_id), submission)
    }

    async fn load_submission(&self, id: Uuid) -> Result<Option<Submission>, StoreError> {
        Self::read_json(&self.submission_path(id))
    }

    async fn save_report(&self, report: &EvaluationReport) -> Result<(), StoreError> {
        Self::write_json(&self.report_path(report.submission_id), report)
    }

    async fn load_report(&self, id: Uuid) -> Result<Option<EvaluationReport>, StoreError> {
        Self::read_json(&self.report_path(id))
    }
}
