// Back-translation augmentation
//
// - Translator: one text, one language pair, one translation
// - marian: MarianMT worker process implementing Translator
// - back_translation: chained source -> pivot -> source rounds
// - pipeline: dataset-level expansion and category balance report

pub mod back_translation;
pub mod marian;
pub mod pipeline;

use async_trait::async_trait;

pub use back_translation::{BackTranslation, BackTranslator};
pub use marian::MarianWorker;
pub use pipeline::{AugmentationPipeline, AugmentationReport, CategoryDeficit};

use crate::config::{BackendConfig, TRANSLATION_MAX_LENGTH};
use crate::error::Result;

/// Translation backend boundary.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` from `source` into `target` language.
    async fn translate(&mut self, text: &str, source: &str, target: &str) -> Result<String>;

    /// Release the backend once no more requests will be made.
    async fn close(&mut self) -> Result<()>;
}

/// Factory for creating translator instances
pub struct TranslatorFactory;

impl TranslatorFactory {
    /// Start the default MarianMT worker with the given beam width.
    pub async fn create_default(backends: &BackendConfig, beam_size: usize) -> Result<Box<dyn Translator>> {
        let worker = MarianWorker::spawn(backends, beam_size, TRANSLATION_MAX_LENGTH).await?;
        Ok(Box::new(worker))
    }
}
