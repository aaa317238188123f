// Classifier fine-tuning
//
// Records are mapped to label indices and handed to a Python backend as a
// job directory (train.jsonl, val.jsonl, job.json). The backend runs the
// training loop and writes the final model and adapter.

pub mod job;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

pub use job::{AdapterJob, LabelMap, LabeledExample, TrainingJob};

use crate::config::{BackendConfig, TrainingSettings};
use crate::dataset::load_dataset;
use crate::error::{PipelineError, Result};

/// Where a finished run left its artifacts.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOutcome {
    pub final_model_dir: PathBuf,
    pub adapter_dir: Option<PathBuf>,
    pub train_examples: usize,
    pub val_examples: usize,
}

/// A job directory ready to hand to the backend.
#[derive(Debug, Clone)]
pub struct PreparedJob {
    pub job_path: PathBuf,
    pub job: TrainingJob,
    pub train_examples: usize,
    pub val_examples: usize,
}

pub struct Trainer {
    settings: TrainingSettings,
    backends: BackendConfig,
}

impl Trainer {
    pub fn new(settings: TrainingSettings, backends: BackendConfig) -> Self {
        Self { settings, backends }
    }

    fn job_dir(&self) -> PathBuf {
        self.settings.save_dir.join("job")
    }

    /// Load both splits, attach labels and write the job directory.
    ///
    /// Fails before anything is written if either split has a category the
    /// config does not list.
    pub async fn prepare(&self) -> Result<PreparedJob> {
        let labels = LabelMap::new(self.settings.labels.clone());

        let train = labels.encode(&load_dataset(&self.settings.train_data_path).await?)?;
        let val = labels.encode(&load_dataset(&self.settings.val_data_path).await?)?;
        info!(
            "Loaded {} training and {} validation examples over {} labels",
            train.len(),
            val.len(),
            labels.labels().len()
        );

        let job_dir = self.job_dir();
        tokio::fs::create_dir_all(&job_dir).await?;

        let job = TrainingJob::from_settings(&self.settings, &job_dir);
        tokio::fs::write(&job.train_file, job::to_jsonl(&train)?).await?;
        tokio::fs::write(&job.val_file, job::to_jsonl(&val)?).await?;

        let job_path = job_dir.join("job.json");
        tokio::fs::write(&job_path, serde_json::to_vec_pretty(&job)?).await?;
        debug!("Training job written to {}", job_path.display());

        Ok(PreparedJob {
            job_path,
            job,
            train_examples: train.len(),
            val_examples: val.len(),
        })
    }

    /// Prepare the job and block until the backend has finished training.
    pub async fn run(&self) -> Result<TrainingOutcome> {
        let script = &self.backends.train_script;
        if !script.exists() {
            return Err(PipelineError::Config(format!(
                "Training script not found: {}",
                script.display()
            )));
        }

        let PreparedJob {
            job_path,
            job,
            train_examples,
            val_examples,
        } = self.prepare().await?;

        info!(
            "Fine-tuning {} for {} epochs (adapter: {})",
            job.model_name,
            job.num_epochs,
            if job.adapter.is_some() { "on" } else { "off" }
        );
        clear_previous_output(&job.final_model_dir).await?;
        if let Some(adapter) = &job.adapter {
            clear_previous_output(&adapter.output_dir).await?;
        }
        run_backend(&self.backends.python, script, &job_path).await?;

        if !job.final_model_dir.exists() {
            return Err(PipelineError::Training(format!(
                "Backend finished but {} was not written",
                job.final_model_dir.display()
            )));
        }

        let adapter_dir = job.adapter.map(|adapter| adapter.output_dir);
        if let Some(dir) = &adapter_dir {
            if !dir.exists() {
                warn!("Adapter directory {} is missing", dir.display());
            }
        }

        info!("Final model saved to {}", job.final_model_dir.display());
        Ok(TrainingOutcome {
            final_model_dir: job.final_model_dir,
            adapter_dir,
            train_examples,
            val_examples,
        })
    }
}

/// Remove a final output directory left by an earlier run.
async fn clear_previous_output(dir: &Path) -> Result<()> {
    if tokio::fs::try_exists(dir).await? {
        warn!("Removing previous output {}", dir.display());
        tokio::fs::remove_dir_all(dir).await?;
    }
    Ok(())
}

/// Run `python script --job job.json`, relaying its output into the log.
async fn run_backend(python: &str, script: &Path, job_path: &Path) -> Result<()> {
    let mut child = Command::new(python)
        .arg(script)
        .arg("--job")
        .arg(job_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| PipelineError::Training(format!("Failed to start training backend: {}", e)))?;

    // stderr carries progress bars and warnings; drained alongside stdout so
    // neither pipe fills up
    let stderr_relay = child.stderr.take().map(|stderr| {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(target: "trainer", "{}", line);
            }
        })
    });

    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            info!(target: "trainer", "{}", line);
        }
    }
    if let Some(relay) = stderr_relay {
        if let Err(e) = relay.await {
            warn!("Training backend stderr relay failed: {}", e);
        }
    }

    let status = child.wait().await?;
    if !status.success() {
        return Err(PipelineError::Training(format!(
            "Training backend exited with {}",
            status
        )));
    }
    Ok(())
}
