// Caption acquisition
//
// The dataset builder only sees the SubtitleSource trait; yt-dlp is the one
// production implementation.

pub mod yt_dlp;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub use yt_dlp::YtDlpScraper;

use crate::config::BackendConfig;
use crate::error::Result;

/// Fetches the caption track of one video.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubtitleSource: Send + Sync {
    /// Download captions for `url` in `language`.
    ///
    /// `Ok(None)` means the video has no captions in that language.
    async fn download_subtitles(&self, url: &str, language: &str) -> Result<Option<PathBuf>>;

    /// Check that the underlying tool can run
    async fn check_availability(&self) -> Result<()>;
}

/// Factory for creating caption sources
pub struct SubtitleSourceFactory;

impl SubtitleSourceFactory {
    pub fn create_default(backends: &BackendConfig, save_dir: &Path) -> Box<dyn SubtitleSource> {
        Box::new(YtDlpScraper::new(backends.yt_dlp.clone(), save_dir))
    }
}

/// Key a caption file by its video id.
///
/// Uses the `v` query parameter when present, otherwise the last path segment,
/// with anything outside `[A-Za-z0-9_-]` replaced by `_`.
pub fn video_id(url: &str) -> String {
    let raw = match url.split_once("v=") {
        Some((_, rest)) => rest.split('&').next().unwrap_or(rest),
        None => url
            .split(['?', '#'])
            .next()
            .unwrap_or(url)
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(url),
    };

    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
