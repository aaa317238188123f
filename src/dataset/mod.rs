// Labeled text datasets
//
// - Record / save / load: the JSON dataset file format
// - builder: scrape -> clean -> chunk -> records
// - report: exploratory summary of an existing dataset file

pub mod builder;
pub mod report;

use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use std::path::Path;
use tokio::fs;
use tracing::{error, info};

pub use builder::{BuildReport, DatasetBuilder, SkipReason, SkippedSource};
pub use report::DatasetReport;

use crate::error::{PipelineError, Result};

/// One labeled text sample.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    pub category: String,
    pub text: String,
}

impl Record {
    pub fn new<S1: Into<String>, S2: Into<String>>(category: S1, text: S2) -> Self {
        Self {
            category: category.into(),
            text: text.into(),
        }
    }
}

/// Serialize records as an indented JSON array, keeping non-ASCII text as-is.
pub fn to_json(records: &[Record]) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    records.serialize(&mut serializer)?;
    Ok(buffer)
}

/// Write `records` to `path`, creating parent directories and replacing any
/// existing file.
pub async fn save_dataset<P: AsRef<Path>>(path: P, records: &[Record]) -> Result<()> {
    let path = path.as_ref();

    let result = async {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, to_json(records)?).await?;
        Ok::<(), PipelineError>(())
    }
    .await;

    match &result {
        Ok(()) => info!("Saved {} records to {}", records.len(), path.display()),
        Err(e) => error!("Failed to save dataset to {}: {}", path.display(), e),
    }
    result
}

/// Read a dataset file written by [`save_dataset`].
pub async fn load_dataset<P: AsRef<Path>>(path: P) -> Result<Vec<Record>> {
    let path = path.as_ref();
    if !fs::try_exists(path).await.unwrap_or(false) {
        return Err(PipelineError::FileNotFound(path.display().to_string()));
    }

    let content = fs::read(path).await?;
    let records: Vec<Record> = serde_json::from_slice(&content)?;
    info!("Loaded {} records from {}", records.len(), path.display());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_then_load_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/dataset.json");
        let records = vec![
            Record::new("спорт", "Матч закончился вничью"),
            Record::new("music", "second"),
            Record::new("спорт", "third"),
        ];

        save_dataset(&path, &records).await.unwrap();
        assert_eq!(load_dataset(&path).await.unwrap(), records);
    }

    #[tokio::test]
    async fn test_save_overwrites_and_keeps_unicode_literal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.json");

        save_dataset(&path, &[Record::new("a", "old"), Record::new("a", "old2")])
            .await
            .unwrap();
        save_dataset(&path, &[Record::new("спорт", "привет")]).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("привет"));
        assert!(!written.contains("\\u"));
        assert!(written.contains("\n        \"category\": \"спорт\""));
        assert_eq!(load_dataset(&path).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_save_to_unwritable_path_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();

        let result = save_dataset(blocker.join("dataset.json"), &[Record::new("a", "b")]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let result = load_dataset("/no/such/dataset.json").await;
        assert!(matches!(result, Err(PipelineError::FileNotFound(_))));
    }

    #[test]
    fn test_json_shape() {
        let json = to_json(&[Record::new("a", "b")]).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(value, serde_json::json!([{ "category": "a", "text": "b" }]));
    }
}
