use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info};

use super::Translator;
use crate::config::BackendConfig;
use crate::error::{PipelineError, Result};

/// One line sent to the worker.
#[derive(Debug, Clone, Serialize)]
pub struct TranslationRequest<'a> {
    pub text: &'a str,
    pub source: &'a str,
    pub target: &'a str,
    pub num_beams: usize,
    pub max_length: usize,
}

/// One line read back from the worker.
#[derive(Debug, Clone, Deserialize)]
pub struct TranslationResponse {
    #[serde(default)]
    pub translation: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl TranslationResponse {
    fn into_result(self) -> Result<String> {
        match (self.translation, self.error) {
            (_, Some(error)) => Err(PipelineError::Translation(error)),
            (Some(translation), None) => Ok(translation),
            (None, None) => Err(PipelineError::Translation(
                "Worker returned neither translation nor error".to_string(),
            )),
        }
    }
}

/// Long-lived MarianMT process speaking newline-delimited JSON.
///
/// Models are loaded once by the worker and reused for every request; each
/// request is answered before the next one is written.
pub struct MarianWorker {
    child: Child,
    /// `None` once the worker has been closed
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    num_beams: usize,
    max_length: usize,
}

impl MarianWorker {
    pub async fn spawn(backends: &BackendConfig, num_beams: usize, max_length: usize) -> Result<Self> {
        if !backends.translate_script.exists() {
            return Err(PipelineError::Config(format!(
                "Translation script not found: {}",
                backends.translate_script.display()
            )));
        }

        info!(
            "Starting translation worker: {} {}",
            backends.python,
            backends.translate_script.display()
        );

        let mut child = Command::new(&backends.python)
            .arg(&backends.translate_script)
            .arg("--model-template")
            .arg(&backends.translation_model_template)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PipelineError::Translation(format!("Failed to start translation worker: {}", e))
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            PipelineError::Translation("Translation worker has no stdin".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            PipelineError::Translation("Translation worker has no stdout".to_string())
        })?;

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
            num_beams,
            max_length,
        })
    }
}

#[async_trait]
impl Translator for MarianWorker {
    async fn translate(&mut self, text: &str, source: &str, target: &str) -> Result<String> {
        let request = TranslationRequest {
            text,
            source,
            target,
            num_beams: self.num_beams,
            max_length: self.max_length,
        };
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');

        let stdin = self.stdin.as_mut().ok_or_else(|| {
            PipelineError::Translation("Translation worker is closed".to_string())
        })?;
        stdin.write_all(line.as_bytes()).await.map_err(|e| {
            PipelineError::Translation(format!("Failed to write to translation worker: {}", e))
        })?;
        stdin.flush().await?;

        let reply = self.stdout.next_line().await?.ok_or_else(|| {
            PipelineError::Translation("Translation worker exited unexpectedly".to_string())
        })?;

        serde_json::from_str::<TranslationResponse>(&reply)
            .map_err(|e| PipelineError::Translation(format!("Malformed worker reply: {}", e)))?
            .into_result()
    }

    /// Close the request stream and wait for the worker to exit.
    async fn close(&mut self) -> Result<()> {
        let Some(stdin) = self.stdin.take() else {
            return Ok(());
        };
        drop(stdin);

        let status = self.child.wait().await?;
        if status.success() {
            debug!("Translation worker exited with {}", status);
            Ok(())
        } else {
            Err(PipelineError::Translation(format!(
                "Translation worker exited with {}",
                status
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_request_line_shape() {
        let request = TranslationRequest {
            text: "привет",
            source: "ru",
            target: "en",
            num_beams: 5,
            max_length: 512,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "text": "привет", "source": "ru", "target": "en",
                "num_beams": 5, "max_length": 512
            })
        );
    }

    #[test]
    fn test_response_parsing() {
        let ok: TranslationResponse = serde_json::from_str(r#"{"translation": "hello"}"#).unwrap();
        assert_eq!(ok.into_result().unwrap(), "hello");

        let failed: TranslationResponse = serde_json::from_str(r#"{"error": "CUDA OOM"}"#).unwrap();
        assert!(matches!(failed.into_result(), Err(PipelineError::Translation(m)) if m == "CUDA OOM"));

        let empty: TranslationResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.into_result().is_err());
    }

    #[tokio::test]
    async fn test_spawn_requires_script() {
        let backends = BackendConfig {
            translate_script: PathBuf::from("/no/such/back_translate.py"),
            ..BackendConfig::default()
        };
        let result = MarianWorker::spawn(&backends, 5, 512).await;
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_round_trip_through_line_protocol() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("echo_worker.sh");
        std::fs::write(
            &script,
            "while read -r line; do echo '{\"translation\": \"echoed\"}'; done\n",
        )
        .unwrap();

        let backends = BackendConfig {
            python: "sh".to_string(),
            translate_script: script,
            ..BackendConfig::default()
        };
        let mut worker = MarianWorker::spawn(&backends, 5, 512).await.unwrap();

        assert_eq!(worker.translate("a", "ru", "en").await.unwrap(), "echoed");
        assert_eq!(worker.translate("b", "en", "ru").await.unwrap(), "echoed");

        worker.close().await.unwrap();
        assert!(matches!(
            worker.translate("c", "ru", "en").await,
            Err(PipelineError::Translation(_))
        ));
        worker.close().await.unwrap();
    }
}
