// Token-window chunking
//
// Text is tokenized once with the classifier's own vocabulary and cut into
// consecutive fixed-length windows, so every chunk fits the model input.

use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokenizers::Tokenizer;
use tracing::info;

use crate::error::{PipelineError, Result};

static SPACED_DOUBLE_HYPHEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*--\s*").expect("hyphen pattern is valid"));

/// Encode/decode between text and vocabulary ids.
pub trait TokenCodec: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<u32>>;
    fn decode(&self, ids: &[u32]) -> Result<String>;
}

/// [`TokenCodec`] over a Hugging Face `tokenizer.json`.
pub struct HfTokenCodec {
    tokenizer: Tokenizer,
}

impl HfTokenCodec {
    /// Load the tokenizer of `model`.
    ///
    /// A local `tokenizer.json` file or a directory holding one is used as-is;
    /// anything else is treated as a hub repository id and fetched through the
    /// hub cache.
    pub fn load(model: &str) -> Result<Self> {
        let path = resolve_tokenizer_file(model)?;
        info!("Loading tokenizer from {}", path.display());
        let mut tokenizer = Tokenizer::from_file(&path).map_err(|e| {
            PipelineError::Tokenizer(format!("Failed to load {}: {}", path.display(), e))
        })?;

        // The whole text is encoded in one pass, so length limits shipped with
        // the model would cut it short before windowing
        tokenizer
            .with_truncation(None)
            .map_err(|e| PipelineError::Tokenizer(format!("Failed to disable truncation: {}", e)))?;
        tokenizer.with_padding(None);

        Ok(Self { tokenizer })
    }
}

fn resolve_tokenizer_file(model: &str) -> Result<PathBuf> {
    let local = Path::new(model);
    if local.is_file() {
        return Ok(local.to_path_buf());
    }
    if local.is_dir() {
        let candidate = local.join("tokenizer.json");
        if candidate.is_file() {
            return Ok(candidate);
        }
        return Err(PipelineError::FileNotFound(candidate.display().to_string()));
    }

    let api = Api::new()
        .map_err(|e| PipelineError::Tokenizer(format!("Failed to initialise hub client: {}", e)))?;
    api.repo(Repo::new(model.to_string(), RepoType::Model))
        .get("tokenizer.json")
        .map_err(|e| {
            PipelineError::Tokenizer(format!("Failed to fetch tokenizer.json for {}: {}", model, e))
        })
}

impl TokenCodec for HfTokenCodec {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| PipelineError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|e| PipelineError::Tokenizer(e.to_string()))
    }
}

/// Normalise `word -- word` style spacing produced by detokenization to `word--word`.
pub fn normalize_hyphens(text: &str) -> String {
    SPACED_DOUBLE_HYPHEN.replace_all(text, "--").into_owned()
}

/// Split `text` into windows of at most `chunk_size` tokens.
///
/// The last window may be shorter. An empty text yields no chunks.
pub fn chunk_text(codec: &dyn TokenCodec, text: &str, chunk_size: usize) -> Result<Vec<String>> {
    if chunk_size == 0 {
        return Err(PipelineError::Config("chunk_size must be at least 1".to_string()));
    }

    let ids = codec.encode(text)?;
    ids.chunks(chunk_size)
        .map(|window| codec.decode(window).map(|decoded| normalize_hyphens(&decoded)))
        .collect()
}

/// Number of chunks a sequence of `token_count` tokens produces.
pub fn chunk_count(token_count: usize, chunk_size: usize) -> usize {
    token_count.div_ceil(chunk_size)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Whitespace tokenizer with a growing vocabulary, for tests.
    #[derive(Default)]
    pub struct WhitespaceCodec {
        vocab: Mutex<Vec<String>>,
    }

    impl TokenCodec for WhitespaceCodec {
        fn encode(&self, text: &str) -> Result<Vec<u32>> {
            let mut vocab = self.vocab.lock().unwrap();
            Ok(text
                .split_whitespace()
                .map(|word| match vocab.iter().position(|w| w == word) {
                    Some(id) => id as u32,
                    None => {
                        vocab.push(word.to_string());
                        (vocab.len() - 1) as u32
                    }
                })
                .collect())
        }

        fn decode(&self, ids: &[u32]) -> Result<String> {
            let vocab = self.vocab.lock().unwrap();
            Ok(ids
                .iter()
                .map(|&id| vocab[id as usize].as_str())
                .collect::<Vec<_>>()
                .join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::WhitespaceCodec;
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_chunks_are_fixed_windows() {
        let codec = WhitespaceCodec::default();
        let chunks = chunk_text(&codec, "a b c d e f g", 3).unwrap();
        assert_eq!(chunks, vec!["a b c", "d e f", "g"]);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        let codec = WhitespaceCodec::default();
        assert!(chunk_text(&codec, "  \n ", 5).unwrap().is_empty());
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        let codec = WhitespaceCodec::default();
        assert!(chunk_text(&codec, "a b", 0).is_err());
    }

    #[test]
    fn test_hyphen_spacing_is_normalized() {
        assert_eq!(normalize_hyphens("wait -- what"), "wait--what");
        assert_eq!(normalize_hyphens("a\n--\tb -- c"), "a--b--c");
        assert_eq!(normalize_hyphens("single - dash"), "single - dash");
    }

    #[test]
    fn test_hf_codec_ignores_bundled_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokenizer.json");
        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": {
                "direction": "Right",
                "max_length": 4,
                "strategy": "LongestFirst",
                "stride": 0
            },
            "padding": null,
            "added_tokens": [],
            "normalizer": null,
            "pre_tokenizer": { "type": "Whitespace" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": {
                    "a": 0, "b": 1, "c": 2, "d": 3, "e": 4,
                    "f": 5, "g": 6, "h": 7, "i": 8, "j": 9, "[UNK]": 10
                },
                "unk_token": "[UNK]"
            }
        });
        std::fs::write(&path, tokenizer_json.to_string()).unwrap();

        let codec = HfTokenCodec::load(path.to_str().unwrap()).unwrap();
        assert_eq!(codec.encode("a b c d e f g h i j").unwrap().len(), 10);

        let chunks = chunk_text(&codec, "a b c d e f g h i j", 3).unwrap();
        assert_eq!(chunks.len(), chunk_count(10, 3));
        assert_eq!(chunks, vec!["a b c", "d e f", "g h i", "j"]);
    }

    #[test]
    fn test_hf_codec_directory_without_tokenizer_json() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            HfTokenCodec::load(dir.path().to_str().unwrap()),
            Err(PipelineError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_chunk_count() {
        assert_eq!(chunk_count(0, 500), 0);
        assert_eq!(chunk_count(500, 500), 1);
        assert_eq!(chunk_count(501, 500), 2);
    }

    proptest! {
        #[test]
        fn chunks_cover_every_token(
            words in prop::collection::vec("[a-z]{1,5}", 0..200),
            chunk_size in 1usize..40,
        ) {
            let codec = WhitespaceCodec::default();
            let text = words.join(" ");
            let chunks = chunk_text(&codec, &text, chunk_size).unwrap();

            prop_assert_eq!(chunks.len(), chunk_count(words.len(), chunk_size));

            let mut total = 0;
            for (i, chunk) in chunks.iter().enumerate() {
                let n = codec.encode(chunk).unwrap().len();
                if i + 1 < chunks.len() {
                    prop_assert_eq!(n, chunk_size);
                }
                total += n;
            }
            prop_assert_eq!(total, words.len());

            let rejoined = chunks.join(" ");
            prop_assert_eq!(rejoined, text);
        }
    }
}
