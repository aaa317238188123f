use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::{TrainingSettings, ADAPTER_TARGET_MODULES, CLASSIFIER_MAX_LENGTH};
use crate::dataset::Record;
use crate::error::{PipelineError, Result};

/// Category -> label index, in config order.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMap {
    labels: Vec<String>,
}

impl LabelMap {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    pub fn index_of(&self, category: &str) -> Option<usize> {
        self.labels.iter().position(|label| label == category)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Attach label indices; any unconfigured category is an error.
    pub fn encode(&self, records: &[Record]) -> Result<Vec<LabeledExample>> {
        records
            .iter()
            .map(|record| {
                self.index_of(&record.category)
                    .map(|label| LabeledExample {
                        text: record.text.clone(),
                        label,
                    })
                    .ok_or_else(|| PipelineError::UnknownCategory(record.category.clone()))
            })
            .collect()
    }
}

/// One line of the train/val JSONL files handed to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledExample {
    pub text: String,
    pub label: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterJob {
    pub r: usize,
    pub alpha: f64,
    pub dropout: f64,
    pub target_modules: Vec<String>,
    pub output_dir: PathBuf,
}

/// Everything the training backend needs, written as `job.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingJob {
    pub model_name: String,
    /// Label names; position is the label index
    pub labels: Vec<String>,
    pub train_file: PathBuf,
    pub val_file: PathBuf,
    /// Checkpoint directory
    pub output_dir: PathBuf,
    pub final_model_dir: PathBuf,
    pub adapter: Option<AdapterJob>,
    pub batch_size: usize,
    pub num_epochs: usize,
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub logging_steps: usize,
    pub save_total_limit: usize,
    pub max_length: usize,
    pub created_at: DateTime<Utc>,
}

impl TrainingJob {
    pub fn from_settings(settings: &TrainingSettings, job_dir: &Path) -> Self {
        let save_dir = &settings.save_dir;
        Self {
            model_name: settings.model_name.clone(),
            labels: settings.labels.clone(),
            train_file: job_dir.join("train.jsonl"),
            val_file: job_dir.join("val.jsonl"),
            output_dir: save_dir.clone(),
            final_model_dir: save_dir.join("final_model"),
            adapter: settings.lora.as_ref().map(|lora| AdapterJob {
                r: lora.r,
                alpha: lora.alpha,
                dropout: lora.dropout,
                target_modules: ADAPTER_TARGET_MODULES.iter().map(|m| m.to_string()).collect(),
                output_dir: save_dir.join("final_adapter"),
            }),
            batch_size: settings.batch_size,
            num_epochs: settings.num_epochs,
            learning_rate: settings.learning_rate,
            weight_decay: settings.weight_decay,
            logging_steps: settings.logging_steps,
            save_total_limit: settings.save_total_limit,
            max_length: CLASSIFIER_MAX_LENGTH,
            created_at: Utc::now(),
        }
    }
}

/// Serialize examples as JSON lines.
pub fn to_jsonl(examples: &[LabeledExample]) -> Result<String> {
    let mut out = String::new();
    for example in examples {
        out.push_str(&serde_json::to_string(example)?);
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoraSettings;

    fn settings(lora: Option<LoraSettings>) -> TrainingSettings {
        TrainingSettings {
            model_name: "bert".to_string(),
            train_data_path: PathBuf::from("train.json"),
            val_data_path: PathBuf::from("val.json"),
            save_dir: PathBuf::from("checkpoints"),
            lora,
            batch_size: 8,
            num_epochs: 3,
            learning_rate: 2e-5,
            weight_decay: 0.01,
            logging_steps: 10,
            save_total_limit: 2,
            labels: vec!["sport".to_string(), "music".to_string()],
        }
    }

    #[test]
    fn test_labels_are_config_positions() {
        let map = LabelMap::new(vec!["sport".to_string(), "music".to_string()]);
        let encoded = map
            .encode(&[Record::new("music", "m"), Record::new("sport", "s")])
            .unwrap();
        assert_eq!(
            encoded,
            vec![
                LabeledExample { text: "m".to_string(), label: 1 },
                LabeledExample { text: "s".to_string(), label: 0 },
            ]
        );
    }

    #[test]
    fn test_unknown_category_is_rejected() {
        let map = LabelMap::new(vec!["sport".to_string()]);
        let result = map.encode(&[Record::new("cooking", "c")]);
        assert!(matches!(result, Err(PipelineError::UnknownCategory(c)) if c == "cooking"));
    }

    #[test]
    fn test_job_paths_and_adapter() {
        let lora = LoraSettings { r: 8, alpha: 16.0, dropout: 0.1 };
        let job = TrainingJob::from_settings(&settings(Some(lora)), Path::new("checkpoints/job"));

        assert_eq!(job.final_model_dir, PathBuf::from("checkpoints/final_model"));
        assert_eq!(job.train_file, PathBuf::from("checkpoints/job/train.jsonl"));
        let adapter = job.adapter.unwrap();
        assert_eq!(adapter.target_modules, vec!["query", "value"]);
        assert_eq!(adapter.output_dir, PathBuf::from("checkpoints/final_adapter"));

        let plain = TrainingJob::from_settings(&settings(None), Path::new("checkpoints/job"));
        assert!(plain.adapter.is_none());
    }

    #[test]
    fn test_jsonl_one_object_per_line() {
        let text = to_jsonl(&[
            LabeledExample { text: "a".to_string(), label: 0 },
            LabeledExample { text: "б".to_string(), label: 1 },
        ])
        .unwrap();
        assert_eq!(text, "{\"text\":\"a\",\"label\":0}\n{\"text\":\"б\",\"label\":1}\n");
    }
}
