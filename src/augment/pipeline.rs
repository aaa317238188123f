use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::{error, info, warn};

use super::BackTranslator;
use crate::config::AugmentationSettings;
use crate::dataset::{load_dataset, save_dataset, Record};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryDeficit {
    pub category: String,
    /// Records still needed to reach the minimum
    pub missing: usize,
}

/// Outcome of an augmentation run.
#[derive(Debug, Clone, Default)]
pub struct AugmentationReport {
    pub input_records: usize,
    pub output_records: usize,
    pub paraphrases: usize,
    /// Records whose back-translation stopped on an error
    pub failed_records: usize,
    pub counts: Vec<(String, usize)>,
    pub deficits: Vec<CategoryDeficit>,
    pub saved_to: Option<PathBuf>,
    pub save_error: Option<String>,
}

/// Count records per category: configured categories first in config order,
/// then any other category in the order it first appears.
pub fn tally_categories(records: &[Record], configured: &[String]) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = configured.iter().map(|c| (c.clone(), 0)).collect();
    for record in records {
        match counts.iter_mut().find(|(name, _)| *name == record.category) {
            Some((_, count)) => *count += 1,
            None => counts.push((record.category.clone(), 1)),
        }
    }
    counts
}

/// Categories whose count is below `min_examples`, with the shortfall.
pub fn find_deficits(counts: &[(String, usize)], min_examples: usize) -> Vec<CategoryDeficit> {
    counts
        .iter()
        .filter(|(_, count)| *count < min_examples)
        .map(|(category, count)| CategoryDeficit {
            category: category.clone(),
            missing: min_examples - count,
        })
        .collect()
}

/// Expands a dataset with back-translated paraphrases and reports categories
/// that remain under the configured minimum.
///
/// Deficits are only reported; no extra samples are synthesized to fill them.
pub struct AugmentationPipeline {
    settings: AugmentationSettings,
    augmenter: BackTranslator,
}

impl AugmentationPipeline {
    pub fn new(settings: AugmentationSettings, augmenter: BackTranslator) -> Self {
        Self {
            settings,
            augmenter,
        }
    }

    /// Hand back the augmenter so its translator can be closed.
    pub fn into_augmenter(self) -> BackTranslator {
        self.augmenter
    }

    /// Each original record followed by its paraphrases, same category.
    pub async fn augment_records(&mut self, records: &[Record]) -> (Vec<Record>, usize) {
        info!("Starting back-translation of {} records", records.len());

        let pb = ProgressBar::new(records.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let mut augmented = Vec::with_capacity(records.len() * (self.settings.bt_rounds + 1));
        let mut failed = 0;

        for record in records {
            augmented.push(record.clone());

            let result = self.augmenter.augment(&record.text).await;
            if let Some(e) = &result.error {
                error!("Back-translation error for a '{}' record: {}", record.category, e);
                failed += 1;
            }
            augmented.extend(
                result
                    .paraphrases
                    .into_iter()
                    .map(|text| Record::new(record.category.clone(), text)),
            );
            pb.inc(1);
        }

        pb.finish_and_clear();
        info!("Back-translation finished");
        (augmented, failed)
    }

    /// Load, augment, check balance and save.
    pub async fn run(&mut self) -> Result<AugmentationReport> {
        let records = load_dataset(&self.settings.input_path).await?;
        let (augmented, failed_records) = self.augment_records(&records).await;

        let counts = tally_categories(&augmented, &self.settings.categories);
        let deficits = find_deficits(&counts, self.settings.min_examples);
        if deficits.is_empty() {
            info!("Every category has at least {} records", self.settings.min_examples);
        } else {
            for deficit in &deficits {
                warn!(
                    "Category '{}' is {} records short of {}",
                    deficit.category, deficit.missing, self.settings.min_examples
                );
            }
        }

        let mut report = AugmentationReport {
            input_records: records.len(),
            output_records: augmented.len(),
            paraphrases: augmented.len() - records.len(),
            failed_records,
            counts,
            deficits,
            ..AugmentationReport::default()
        };

        match save_dataset(&self.settings.output_path, &augmented).await {
            Ok(()) => report.saved_to = Some(self.settings.output_path.clone()),
            Err(e) => report.save_error = Some(e.to_string()),
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::augment::MockTranslator;
    use crate::error::PipelineError;
    use proptest::prelude::*;
    use std::path::Path;

    fn settings(dir: &Path, min_examples: usize, rounds: usize) -> AugmentationSettings {
        AugmentationSettings {
            input_path: dir.join("in.json"),
            output_path: dir.join("out/augmented.json"),
            min_examples,
            bt_rounds: rounds,
            bt_beam_size: 5,
            source_language: "ru".to_string(),
            pivot_language: "en".to_string(),
            categories: vec!["A".to_string()],
        }
    }

    fn failing_translator() -> MockTranslator {
        let mut translator = MockTranslator::new();
        translator
            .expect_translate()
            .returning(|_, _, _| Err(PipelineError::Translation("model unavailable".to_string())));
        translator
    }

    fn echo_translator() -> MockTranslator {
        let mut translator = MockTranslator::new();
        translator
            .expect_translate()
            .returning(|text, _, target| Ok(format!("{}>{}", text, target)));
        translator
    }

    #[tokio::test]
    async fn test_failed_translations_keep_originals_and_report_deficit() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path(), 500, 2);
        let originals = vec![
            Record::new("A", "один"),
            Record::new("A", "два"),
            Record::new("A", "три"),
        ];
        save_dataset(&settings.input_path, &originals).await.unwrap();

        let augmenter = BackTranslator::new(Box::new(failing_translator()), "ru", "en", 2);
        let mut pipeline = AugmentationPipeline::new(settings.clone(), augmenter);
        let report = pipeline.run().await.unwrap();

        assert_eq!(
            report.deficits,
            vec![CategoryDeficit { category: "A".to_string(), missing: 497 }]
        );
        assert_eq!(report.failed_records, 3);
        assert_eq!(report.paraphrases, 0);
        assert_eq!(load_dataset(&settings.output_path).await.unwrap(), originals);
    }

    #[tokio::test]
    async fn test_paraphrases_follow_their_original() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path(), 3, 2);
        save_dataset(&settings.input_path, &[Record::new("A", "x"), Record::new("B", "y")])
            .await
            .unwrap();

        let augmenter = BackTranslator::new(Box::new(echo_translator()), "ru", "en", 2);
        let mut pipeline = AugmentationPipeline::new(settings.clone(), augmenter);
        let report = pipeline.run().await.unwrap();

        let saved = load_dataset(&settings.output_path).await.unwrap();
        assert_eq!(
            saved,
            vec![
                Record::new("A", "x"),
                Record::new("A", "x>en>ru"),
                Record::new("A", "x>en>ru>en>ru"),
                Record::new("B", "y"),
                Record::new("B", "y>en>ru"),
                Record::new("B", "y>en>ru>en>ru"),
            ]
        );
        assert_eq!(report.counts, vec![("A".to_string(), 3), ("B".to_string(), 3)]);
        assert!(report.deficits.is_empty());
    }

    #[tokio::test]
    async fn test_augmenter_is_returned_for_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let mut translator = echo_translator();
        translator.expect_close().times(1).returning(|| Ok(()));

        let augmenter = BackTranslator::new(Box::new(translator), "ru", "en", 1);
        let pipeline = AugmentationPipeline::new(settings(dir.path(), 1, 1), augmenter);
        pipeline.into_augmenter().close().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let augmenter = BackTranslator::new(Box::new(echo_translator()), "ru", "en", 1);
        let mut pipeline = AugmentationPipeline::new(settings(dir.path(), 1, 1), augmenter);
        assert!(matches!(pipeline.run().await, Err(PipelineError::FileNotFound(_))));
    }

    #[test]
    fn test_configured_category_without_records_is_a_deficit() {
        let counts = tally_categories(&[Record::new("A", "t")], &["A".to_string(), "B".to_string()]);
        assert_eq!(counts, vec![("A".to_string(), 1), ("B".to_string(), 0)]);
        assert_eq!(
            find_deficits(&counts, 2),
            vec![
                CategoryDeficit { category: "A".to_string(), missing: 1 },
                CategoryDeficit { category: "B".to_string(), missing: 2 },
            ]
        );
    }

    proptest! {
        #[test]
        fn output_contains_every_original_in_place(
            texts in prop::collection::vec("[a-z]{1,8}", 0..12),
            rounds in 1usize..4,
            fail_every in 1usize..5,
        ) {
            let records: Vec<Record> = texts.iter().map(|t| Record::new("A", t.clone())).collect();

            let mut calls = 0usize;
            let mut translator = MockTranslator::new();
            translator.expect_translate().returning(move |text, _, _| {
                calls += 1;
                if calls % fail_every == 0 {
                    Err(PipelineError::Translation("flaky".to_string()))
                } else {
                    Ok(format!("{}~", text))
                }
            });

            let dir = tempfile::tempdir().unwrap();
            let augmenter = BackTranslator::new(Box::new(translator), "ru", "en", rounds);
            let mut pipeline = AugmentationPipeline::new(settings(dir.path(), 1, rounds), augmenter);
            let (augmented, _) = tokio_test::block_on(pipeline.augment_records(&records));

            prop_assert!(augmented.len() >= records.len());
            prop_assert!(augmented.len() <= records.len() * (rounds + 1));

            let mut cursor = 0;
            for original in &records {
                let position = augmented[cursor..].iter().position(|r| r == original);
                prop_assert!(position.is_some());
                cursor += position.unwrap_or_default() + 1;
            }
        }
    }
}
