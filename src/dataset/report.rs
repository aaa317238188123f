use std::collections::HashSet;
use tracing::{info, warn};

use super::Record;

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryStats {
    pub category: String,
    pub count: usize,
    /// Share of all records, 0.0..=1.0
    pub share: f64,
    pub configured: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LengthStats {
    pub min: usize,
    pub mean: f64,
    pub max: usize,
}

/// Exploratory summary of a dataset file.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetReport {
    pub total: usize,
    /// Configured categories first, in config order, then unknown ones as seen
    pub categories: Vec<CategoryStats>,
    pub empty_texts: usize,
    pub duplicates: usize,
    /// Text length in characters
    pub text_length: LengthStats,
}

impl DatasetReport {
    pub fn analyze(records: &[Record], configured: &[String]) -> Self {
        let mut counts: Vec<(String, usize, bool)> = configured
            .iter()
            .map(|name| (name.clone(), 0, true))
            .collect();

        for record in records {
            match counts.iter_mut().find(|(name, _, _)| *name == record.category) {
                Some(entry) => entry.1 += 1,
                None => counts.push((record.category.clone(), 1, false)),
            }
        }

        let total = records.len();
        let categories = counts
            .into_iter()
            .map(|(category, count, configured)| CategoryStats {
                category,
                count,
                share: if total == 0 { 0.0 } else { count as f64 / total as f64 },
                configured,
            })
            .collect();

        let mut seen = HashSet::new();
        let duplicates = records.iter().filter(|r| !seen.insert(*r)).count();
        let empty_texts = records.iter().filter(|r| r.text.trim().is_empty()).count();

        let lengths: Vec<usize> = records.iter().map(|r| r.text.chars().count()).collect();
        let text_length = if lengths.is_empty() {
            LengthStats::default()
        } else {
            LengthStats {
                min: lengths.iter().copied().min().unwrap_or_default(),
                mean: lengths.iter().sum::<usize>() as f64 / lengths.len() as f64,
                max: lengths.iter().copied().max().unwrap_or_default(),
            }
        };

        Self {
            total,
            categories,
            empty_texts,
            duplicates,
            text_length,
        }
    }

    /// Categories present in the data but missing from the configuration.
    pub fn unknown_categories(&self) -> Vec<&str> {
        self.categories
            .iter()
            .filter(|c| !c.configured)
            .map(|c| c.category.as_str())
            .collect()
    }

    /// Emit findings at the appropriate level.
    pub fn log_findings(&self) {
        info!("Dataset holds {} records in {} categories", self.total, self.categories.len());
        if self.duplicates > 0 {
            warn!("Found {} duplicate records", self.duplicates);
        } else {
            info!("No duplicate records");
        }
        if self.empty_texts > 0 {
            warn!("Found {} records with empty text", self.empty_texts);
        }
        for name in self.unknown_categories() {
            warn!("Category '{}' is not in the configuration", name);
        }
        for stats in self.categories.iter().filter(|c| c.configured && c.count == 0) {
            warn!("Category '{}' has no records", stats.category);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_follow_config_order_then_unknown() {
        let records = vec![
            Record::new("b", "hello"),
            Record::new("x", "hi"),
            Record::new("b", "hello"),
            Record::new("a", "  "),
        ];
        let configured = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let report = DatasetReport::analyze(&records, &configured);

        let names: Vec<(&str, usize)> = report
            .categories
            .iter()
            .map(|c| (c.category.as_str(), c.count))
            .collect();
        assert_eq!(names, vec![("a", 1), ("b", 2), ("c", 0), ("x", 1)]);
        assert_eq!(report.unknown_categories(), vec!["x"]);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.empty_texts, 1);
        assert_eq!(report.text_length.min, 2);
        assert_eq!(report.text_length.max, 5);
        assert!((report.categories[1].share - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_dataset() {
        let report = DatasetReport::analyze(&[], &["a".to_string()]);
        assert_eq!(report.total, 0);
        assert_eq!(report.text_length, LengthStats::default());
        assert_eq!(report.categories[0].share, 0.0);
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        let report = DatasetReport::analyze(&[Record::new("a", "привет")], &[]);
        assert_eq!(report.text_length.max, 6);
    }
}
