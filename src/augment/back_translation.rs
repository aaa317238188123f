use tracing::{debug, warn};

use super::Translator;
use crate::error::{PipelineError, Result};

/// Paraphrases produced for one text.
#[derive(Debug, Default)]
pub struct BackTranslation {
    /// One entry per completed round, in round order
    pub paraphrases: Vec<String>,
    /// Set when a round failed and the remaining rounds were abandoned
    pub error: Option<PipelineError>,
}

/// Round-trips text through a pivot language to produce paraphrases.
///
/// Rounds are chained: round N translates the output of round N-1, so later
/// paraphrases drift further from the original.
pub struct BackTranslator {
    translator: Box<dyn Translator>,
    source_language: String,
    pivot_language: String,
    rounds: usize,
}

impl BackTranslator {
    pub fn new(
        translator: Box<dyn Translator>,
        source_language: impl Into<String>,
        pivot_language: impl Into<String>,
        rounds: usize,
    ) -> Self {
        Self {
            translator,
            source_language: source_language.into(),
            pivot_language: pivot_language.into(),
            rounds,
        }
    }

    async fn round_trip(&mut self, text: &str) -> Result<String> {
        let pivot = self
            .translator
            .translate(text, &self.source_language, &self.pivot_language)
            .await?;
        self.translator
            .translate(&pivot, &self.pivot_language, &self.source_language)
            .await
    }

    /// Close the underlying translator.
    pub async fn close(&mut self) -> Result<()> {
        self.translator.close().await
    }

    /// Produce up to `rounds` paraphrases of `text`.
    pub async fn augment(&mut self, text: &str) -> BackTranslation {
        let mut result = BackTranslation::default();
        let mut current = text.to_string();

        for round in 1..=self.rounds {
            match self.round_trip(&current).await {
                Ok(back) => {
                    debug!("Round {} paraphrase: {}", round, back);
                    result.paraphrases.push(back.clone());
                    current = back;
                }
                Err(e) => {
                    warn!("Back-translation failed at round {}: {}", round, e);
                    result.error = Some(e);
                    break;
                }
            }
        }

        result
    }
}
