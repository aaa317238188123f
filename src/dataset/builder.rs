use std::fmt;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, warn};

use super::{save_dataset, Record};
use crate::chunk::{chunk_text, TokenCodec};
use crate::config::ScrapeSettings;
use crate::scrape::SubtitleSource;
use crate::subtitle::{cleaned_path, preprocess_file};

/// Why a source URL contributed no records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoSubtitles,
    ReadError,
    EmptyText,
    ProcessingError,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NoSubtitles => "no subtitles",
            Self::ReadError => "read error",
            Self::EmptyText => "empty text",
            Self::ProcessingError => "processing error",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedSource {
    pub category: String,
    pub url: String,
    pub reason: SkipReason,
}

/// Outcome of a dataset build.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub total_urls: usize,
    pub downloaded: usize,
    pub records: usize,
    pub skipped: Vec<SkippedSource>,
    /// Set when the dataset was written
    pub saved_to: Option<PathBuf>,
    /// Set when writing the dataset failed
    pub save_error: Option<String>,
}

/// Turns the configured category -> URL lists into a labeled dataset.
pub struct DatasetBuilder {
    settings: ScrapeSettings,
    source: Box<dyn SubtitleSource>,
    codec: Box<dyn TokenCodec>,
}

impl DatasetBuilder {
    pub fn new(
        settings: ScrapeSettings,
        source: Box<dyn SubtitleSource>,
        codec: Box<dyn TokenCodec>,
    ) -> Self {
        Self {
            settings,
            source,
            codec,
        }
    }

    /// Visit every (category, URL) pair in config order and chunk its captions.
    ///
    /// Failures are recorded per URL; the loop never stops early.
    pub async fn collect(&self) -> (Vec<Record>, BuildReport) {
        let mut records = Vec::new();
        let mut report = BuildReport::default();

        for (category, urls) in self.settings.categories.iter() {
            for url in urls {
                report.total_urls += 1;
                info!("Processing {} (category: {})", url, category);

                let outcome = self.process_source(category, url, &mut report.downloaded).await;
                match outcome {
                    Ok(chunks) => {
                        info!("{} chunks from {}", chunks.len(), url);
                        records.extend(chunks);
                    }
                    Err(reason) => {
                        warn!("Skipped {}: {}", url, reason);
                        report.skipped.push(SkippedSource {
                            category: category.to_string(),
                            url: url.clone(),
                            reason,
                        });
                    }
                }
            }
        }

        report.records = records.len();
        (records, report)
    }

    async fn process_source(
        &self,
        category: &str,
        url: &str,
        downloaded: &mut usize,
    ) -> std::result::Result<Vec<Record>, SkipReason> {
        let caption_path = match self.source.download_subtitles(url, &self.settings.language).await {
            Ok(Some(path)) => path,
            Ok(None) => return Err(SkipReason::NoSubtitles),
            Err(e) => {
                error!("Caption download failed for {}: {}", url, e);
                return Err(SkipReason::ProcessingError);
            }
        };
        *downloaded += 1;

        let cleaned = cleaned_path(&caption_path);
        match preprocess_file(&caption_path, &cleaned).await {
            Ok(true) => {}
            Ok(false) => return Err(SkipReason::NoSubtitles),
            Err(e) => {
                error!("Failed to clean {}: {}", caption_path.display(), e);
                return Err(SkipReason::ReadError);
            }
        }

        let text = fs::read_to_string(&cleaned).await.map_err(|e| {
            error!("Failed to read {}: {}", cleaned.display(), e);
            SkipReason::ReadError
        })?;
        if text.trim().is_empty() {
            return Err(SkipReason::EmptyText);
        }

        let chunks = chunk_text(self.codec.as_ref(), &text, self.settings.chunk_size).map_err(|e| {
            error!("Failed to chunk captions of {}: {}", url, e);
            SkipReason::ProcessingError
        })?;
        if chunks.is_empty() {
            return Err(SkipReason::EmptyText);
        }

        Ok(chunks
            .into_iter()
            .map(|chunk| Record::new(category, chunk))
            .collect())
    }

    /// Collect records and write them to the dataset file when there are any.
    pub async fn build_dataset(&self) -> BuildReport {
        let (records, mut report) = self.collect().await;

        if records.is_empty() {
            warn!("Dataset is empty, nothing saved");
        } else {
            let path = self.settings.dataset_path();
            match save_dataset(&path, &records).await {
                Ok(()) => report.saved_to = Some(path),
                Err(e) => report.save_error = Some(e.to_string()),
            }
        }

        info!(
            "Downloaded captions for {}/{} videos, {} records",
            report.downloaded, report.total_urls, report.records
        );
        for skipped in &report.skipped {
            warn!("  {} ({}): {}", skipped.url, skipped.category, skipped.reason);
        }
        report
    }
}
