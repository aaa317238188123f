use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{video_id, SubtitleSource};
use crate::command::{check_tool_available, ToolCommand};
use crate::error::{PipelineError, Result};

/// Caption downloader backed by the `yt-dlp` command-line tool.
pub struct YtDlpScraper {
    binary_path: String,
    save_dir: PathBuf,
}

impl YtDlpScraper {
    pub fn new<P: AsRef<Path>>(binary_path: String, save_dir: P) -> Self {
        Self {
            binary_path,
            save_dir: save_dir.as_ref().to_path_buf(),
        }
    }

    /// Build the caption-only download command
    fn download_command(&self, url: &str, id: &str, language: &str) -> ToolCommand {
        let template = self.save_dir.join(format!("{}.%(ext)s", id));
        ToolCommand::new(&self.binary_path, "Caption download")
            .on_failure(PipelineError::Scrape)
            .arg("--skip-download")
            .arg("--write-subs")
            .arg("--write-auto-subs")
            .option("--sub-langs", language)
            .option("--sub-format", "vtt")
            .arg("--output")
            .path(template)
            .args(["--quiet", "--no-warnings"])
            .arg(url)
    }

    /// Locate a freshly written caption file for `id` (e.g. `id.ru.vtt`).
    fn find_downloaded(&self, id: &str, expected: &Path) -> Option<PathBuf> {
        let prefix = format!("{}.", id);
        WalkDir::new(&self.save_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .find(|path| {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                path != expected && name.starts_with(&prefix) && name.ends_with(".vtt")
            })
    }
}

#[async_trait]
impl SubtitleSource for YtDlpScraper {
    async fn download_subtitles(&self, url: &str, language: &str) -> Result<Option<PathBuf>> {
        fs::create_dir_all(&self.save_dir).await?;

        let id = video_id(url);
        let expected = self.save_dir.join(format!("{}.vtt", id));

        debug!("Requesting '{}' captions for {} (id {})", language, url, id);
        self.download_command(url, &id, language).execute().await?;

        let Some(downloaded) = self.find_downloaded(&id, &expected) else {
            warn!("No '{}' captions found for {}", language, url);
            return Ok(None);
        };

        if fs::try_exists(&expected).await.unwrap_or(false) {
            fs::remove_file(&expected).await?;
        }
        fs::rename(&downloaded, &expected).await?;

        info!("Captions saved: {}", expected.display());
        Ok(Some(expected))
    }

    async fn check_availability(&self) -> Result<()> {
        let version = check_tool_available(&self.binary_path).await?;
        info!("Using {} {}", self.binary_path, version);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_command_arguments() {
        let scraper = YtDlpScraper::new("yt-dlp".to_string(), "data/raw");
        let cmd = scraper.download_command("https://youtu.be/abc", "abc", "ru");

        assert_eq!(cmd.program, "yt-dlp");
        assert!(cmd.args.windows(2).any(|w| w == ["--sub-langs", "ru"]));
        assert!(cmd.args.contains(&"data/raw/abc.%(ext)s".to_string()));
        assert_eq!(cmd.args.last().map(String::as_str), Some("https://youtu.be/abc"));
    }

    #[test]
    fn test_find_downloaded_ignores_other_videos_and_previous_result() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("abc.vtt"), "old").unwrap();
        std::fs::write(dir.path().join("abcd.ru.vtt"), "other video").unwrap();
        std::fs::write(dir.path().join("abc_cleaned.txt"), "cleaned").unwrap();

        let scraper = YtDlpScraper::new("yt-dlp".to_string(), dir.path());
        let expected = dir.path().join("abc.vtt");
        assert_eq!(scraper.find_downloaded("abc", &expected), None);

        std::fs::write(dir.path().join("abc.ru.vtt"), "fresh").unwrap();
        assert_eq!(
            scraper.find_downloaded("abc", &expected),
            Some(dir.path().join("abc.ru.vtt"))
        );
    }
}
