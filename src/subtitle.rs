use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::fs;
use tracing::{info, warn};

use crate::error::Result;

static TIME_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{2}:\d{2}:\d{2}\.\d{3} --> \d{2}:\d{2}:\d{2}\.\d{3}")
        .expect("time range pattern is valid")
});

static CUE_TIMESTAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\d{2}:\d{2}:\d{2}\.\d{3}>").expect("cue timestamp pattern is valid"));

static CUE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?c(?:\.[^>\s]*)?>").expect("cue tag pattern is valid"));

static HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)WEBVTT|Kind: captions|Language: \w+").expect("header pattern is valid")
});

static POSITION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"align:start position:\d+%").expect("position pattern is valid"));

/// Strip WebVTT structure from caption text.
///
/// Removes cue timings, inline timestamps, `<c>` styling tags, header lines and
/// positioning directives, then drops blank lines and trims the rest.
pub fn clean_text(text: &str) -> String {
    let text = TIME_RANGE.replace_all(text, "");
    let text = CUE_TIMESTAMP.replace_all(&text, "");
    let text = CUE_TAG.replace_all(&text, "");
    let text = HEADER.replace_all(&text, "");
    let text = POSITION.replace_all(&text, "");

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse runs of identical consecutive lines into one.
///
/// Only neighbours are compared; a line repeated later in the text is kept.
pub fn remove_consecutive_duplicates(text: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    for line in text.split('\n') {
        if kept.last() != Some(&line) {
            kept.push(line);
        }
    }
    kept.join("\n")
}

/// Full cleaning pass: markup removal followed by consecutive dedup.
pub fn preprocess(text: &str) -> String {
    remove_consecutive_duplicates(&clean_text(text))
}

/// Path of the cleaned counterpart of a caption file (`abc.vtt` -> `abc_cleaned.txt`).
pub fn cleaned_path<P: AsRef<Path>>(caption_path: P) -> PathBuf {
    let caption_path = caption_path.as_ref();
    let stem = caption_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    caption_path.with_file_name(format!("{}_cleaned.txt", stem))
}

/// Clean a caption file and write the result to `output_path`.
///
/// Returns `Ok(false)` without writing anything when the input does not exist.
pub async fn preprocess_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input_path: P,
    output_path: Q,
) -> Result<bool> {
    let input_path = input_path.as_ref();
    let output_path = output_path.as_ref();

    if !fs::try_exists(input_path).await.unwrap_or(false) {
        warn!("Caption file not found: {}", input_path.display());
        return Ok(false);
    }

    let raw_text = fs::read_to_string(input_path).await?;
    fs::write(output_path, preprocess(&raw_text)).await?;

    info!("Cleaned captions written to {}", output_path.display());
    Ok(true)
}
