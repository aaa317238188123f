use regex::{Captures, Regex};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use serde_yaml::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::debug;

use crate::error::{PipelineError, Result};

static ENV_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("placeholder pattern is valid"));

/// Top-level keys understood by [`Config`]. Anything else is ignored.
const KNOWN_KEYS: &[&str] = &[
    "model_name",
    "categories",
    "subtitles_dir",
    "output_dir",
    "subtitle_language",
    "chunk_size",
    "train_data_path",
    "val_data_path",
    "save_dir",
    "use_lora",
    "lora_r",
    "lora_alpha",
    "lora_dropout",
    "batch_size",
    "num_epochs",
    "learning_rate",
    "weight_decay",
    "logging_steps",
    "save_total_limit",
    "log_level",
    "log_dir",
    "augmentation",
    "backends",
];

/// Maximum token length used by the translation backend, with truncation beyond it.
pub const TRANSLATION_MAX_LENGTH: usize = 512;

/// Sequence length the classifier is trained on.
pub const CLASSIFIER_MAX_LENGTH: usize = 512;

/// Attention projections wrapped by the low-rank adapter.
pub const ADAPTER_TARGET_MODULES: &[&str] = &["query", "value"];

fn default_subtitle_language() -> String {
    "ru".to_string()
}

fn default_chunk_size() -> usize {
    500
}

fn default_logging_steps() -> usize {
    10
}

fn default_save_total_limit() -> usize {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_source_language() -> String {
    "ru".to_string()
}

fn default_pivot_language() -> String {
    "en".to_string()
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_yt_dlp() -> String {
    "yt-dlp".to_string()
}

fn default_translate_script() -> PathBuf {
    PathBuf::from("scripts/back_translate.py")
}

fn default_train_script() -> PathBuf {
    PathBuf::from("scripts/train_classifier.py")
}

fn default_translation_model_template() -> String {
    "Helsinki-NLP/opus-mt-{src}-{tgt}".to_string()
}

/// A numeric or boolean field written either as a YAML scalar or as text,
/// e.g. after `${VAR}` substitution.
#[derive(Deserialize)]
#[serde(untagged)]
enum ScalarOrText<T> {
    Scalar(T),
    Text(String),
}

impl<T> ScalarOrText<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    fn into_value<E: de::Error>(self) -> std::result::Result<T, E> {
        match self {
            Self::Scalar(value) => Ok(value),
            Self::Text(text) => text
                .trim()
                .parse()
                .map_err(|e| E::custom(format!("invalid value '{}': {}", text, e))),
        }
    }
}

fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: fmt::Display,
{
    ScalarOrText::<T>::deserialize(deserializer)?.into_value()
}

fn lenient_opt<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: fmt::Display,
{
    Option::<ScalarOrText<T>>::deserialize(deserializer)?
        .map(ScalarOrText::into_value)
        .transpose()
}

/// Pipeline configuration as read from `config.yaml`.
///
/// Only `model_name` and `categories` are needed by every task. The remaining
/// fields are checked when a task asks for its settings view, so a config
/// written for scraping does not have to carry training hyperparameters.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Hugging Face model id (or local path) of the pretrained classifier
    pub model_name: String,
    /// Category name -> source video URLs, in file order
    pub categories: Categories,

    pub subtitles_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    /// Caption language requested from the download tool
    #[serde(default = "default_subtitle_language")]
    pub subtitle_language: String,
    /// Chunk size in model vocabulary tokens
    #[serde(default = "default_chunk_size", deserialize_with = "lenient")]
    pub chunk_size: usize,

    pub train_data_path: Option<PathBuf>,
    pub val_data_path: Option<PathBuf>,
    pub save_dir: Option<PathBuf>,
    #[serde(default, deserialize_with = "lenient_opt")]
    pub use_lora: Option<bool>,
    #[serde(default, deserialize_with = "lenient_opt")]
    pub lora_r: Option<usize>,
    #[serde(default, deserialize_with = "lenient_opt")]
    pub lora_alpha: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt")]
    pub lora_dropout: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt")]
    pub batch_size: Option<usize>,
    #[serde(default, deserialize_with = "lenient_opt")]
    pub num_epochs: Option<usize>,
    #[serde(default, deserialize_with = "lenient_opt")]
    pub learning_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt")]
    pub weight_decay: Option<f64>,
    #[serde(default = "default_logging_steps", deserialize_with = "lenient")]
    pub logging_steps: usize,
    /// Number of most recent checkpoints kept by the training backend
    #[serde(default = "default_save_total_limit", deserialize_with = "lenient")]
    pub save_total_limit: usize,

    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    pub augmentation: Option<AugmentationSection>,
    #[serde(default)]
    pub backends: BackendConfig,

    /// Top-level keys present in the file but not understood
    #[serde(skip)]
    pub ignored_keys: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AugmentationSection {
    pub input_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    /// Minimum number of records each category should reach
    #[serde(default, deserialize_with = "lenient_opt")]
    pub min_examples: Option<usize>,
    /// Number of chained back-translation rounds
    #[serde(default, deserialize_with = "lenient_opt")]
    pub bt_rounds: Option<usize>,
    /// Beam width used by the translation backend
    #[serde(default, deserialize_with = "lenient_opt")]
    pub bt_beam_size: Option<usize>,
    #[serde(default = "default_source_language")]
    pub source_language: String,
    #[serde(default = "default_pivot_language")]
    pub pivot_language: String,
}

/// External tools the pipeline shells out to.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_python")]
    pub python: String,
    #[serde(default = "default_yt_dlp")]
    pub yt_dlp: String,
    #[serde(default = "default_translate_script")]
    pub translate_script: PathBuf,
    #[serde(default = "default_train_script")]
    pub train_script: PathBuf,
    /// `{src}` and `{tgt}` are replaced by language codes
    #[serde(default = "default_translation_model_template")]
    pub translation_model_template: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
            yt_dlp: default_yt_dlp(),
            translate_script: default_translate_script(),
            train_script: default_train_script(),
            translation_model_template: default_translation_model_template(),
        }
    }
}

/// Ordered category -> URL list mapping.
///
/// Iteration follows the order the categories appear in the YAML file; the
/// label index of a category is its position here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Categories(Vec<(String, Vec<String>)>);

impl Categories {
    pub fn new(entries: Vec<(String, Vec<String>)>) -> Self {
        Self(entries)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(name, urls)| (name.as_str(), urls.as_slice()))
    }

    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|(n, _)| n == name)
    }

    pub fn url_count(&self) -> usize {
        self.0.iter().map(|(_, urls)| urls.len()).sum()
    }
}

impl<'de> Deserialize<'de> for Categories {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct CategoriesVisitor;

        impl<'de> Visitor<'de> for CategoriesVisitor {
            type Value = Categories;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a mapping of category names to lists of URLs")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries: Vec<(String, Vec<String>)> = Vec::new();
                while let Some((name, urls)) = map.next_entry::<String, Option<Vec<String>>>()? {
                    if entries.iter().any(|(existing, _)| *existing == name) {
                        return Err(de::Error::custom(format!("duplicate category '{}'", name)));
                    }
                    entries.push((name, urls.unwrap_or_default()));
                }
                Ok(Categories(entries))
            }
        }

        deserializer.deserialize_map(CategoriesVisitor)
    }
}

/// Settings for the `scrape` task.
#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub model_name: String,
    pub subtitles_dir: PathBuf,
    pub output_dir: PathBuf,
    pub language: String,
    pub chunk_size: usize,
    pub categories: Categories,
}

impl ScrapeSettings {
    /// Where the built dataset is written.
    pub fn dataset_path(&self) -> PathBuf {
        self.output_dir.join("dataset.json")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoraSettings {
    pub r: usize,
    pub alpha: f64,
    pub dropout: f64,
}

/// Settings for the `train` task.
#[derive(Debug, Clone)]
pub struct TrainingSettings {
    pub model_name: String,
    pub train_data_path: PathBuf,
    pub val_data_path: PathBuf,
    pub save_dir: PathBuf,
    /// Present when the low-rank adapter is enabled
    pub lora: Option<LoraSettings>,
    pub batch_size: usize,
    pub num_epochs: usize,
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub logging_steps: usize,
    pub save_total_limit: usize,
    /// Category names in label-index order
    pub labels: Vec<String>,
}

/// Settings for the `augment` task.
#[derive(Debug, Clone)]
pub struct AugmentationSettings {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub min_examples: usize,
    pub bt_rounds: usize,
    pub bt_beam_size: usize,
    pub source_language: String,
    pub pivot_language: String,
    pub categories: Vec<String>,
}

/// Settings for the `eda` task.
#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub dataset_path: PathBuf,
    pub categories: Vec<String>,
}

fn require<T: Clone>(value: &Option<T>, field: &str, task: &str) -> Result<T> {
    value.clone().ok_or_else(|| PipelineError::MissingField {
        field: field.to_string(),
        task: task.to_string(),
    })
}

impl Config {
    /// Read, interpolate and validate a YAML configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        Self::from_yaml_str(&content, |name| std::env::var(name).ok())
    }

    /// Parse configuration text, resolving `${VAR}` placeholders through `lookup`.
    pub fn from_yaml_str<F>(content: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw: Value = serde_yaml::from_str(content)?;

        let ignored_keys: Vec<String> = match &raw {
            Value::Mapping(mapping) => mapping
                .keys()
                .filter_map(Value::as_str)
                .filter(|key| !KNOWN_KEYS.contains(key))
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };

        let resolved = resolve_env_vars(raw, &lookup);
        let mut config: Config = serde_yaml::from_value(resolved)?;
        config.ignored_keys = ignored_keys;

        config.validate()?;
        Ok(config)
    }

    /// Report keys that were skipped while loading.
    pub fn log_ignored_keys(&self) {
        for key in &self.ignored_keys {
            debug!("Ignoring unknown configuration key '{}'", key);
        }
    }

    /// Schema checks that apply regardless of the task.
    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(PipelineError::Config("model_name must not be empty".to_string()));
        }
        if self.categories.is_empty() {
            return Err(PipelineError::Config("at least one category is required".to_string()));
        }
        if self.categories.iter().any(|(name, _)| name.trim().is_empty()) {
            return Err(PipelineError::Config("category names must not be empty".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(PipelineError::Config("chunk_size must be at least 1".to_string()));
        }
        if self.lora_r == Some(0) {
            return Err(PipelineError::Config("lora_r must be at least 1".to_string()));
        }
        if let Some(dropout) = self.lora_dropout {
            if !(0.0..1.0).contains(&dropout) {
                return Err(PipelineError::Config(format!(
                    "lora_dropout must be in [0, 1), got {}",
                    dropout
                )));
            }
        }
        if self.batch_size == Some(0) {
            return Err(PipelineError::Config("batch_size must be at least 1".to_string()));
        }
        if self.num_epochs == Some(0) {
            return Err(PipelineError::Config("num_epochs must be at least 1".to_string()));
        }
        if let Some(lr) = self.learning_rate {
            if lr <= 0.0 {
                return Err(PipelineError::Config(format!(
                    "learning_rate must be positive, got {}",
                    lr
                )));
            }
        }
        if let Some(aug) = &self.augmentation {
            if aug.bt_rounds == Some(0) {
                return Err(PipelineError::Config(
                    "augmentation.bt_rounds must be at least 1".to_string(),
                ));
            }
            if aug.bt_beam_size == Some(0) {
                return Err(PipelineError::Config(
                    "augmentation.bt_beam_size must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn scrape_settings(&self) -> Result<ScrapeSettings> {
        const TASK: &str = "scrape";
        Ok(ScrapeSettings {
            model_name: self.model_name.clone(),
            subtitles_dir: require(&self.subtitles_dir, "subtitles_dir", TASK)?,
            output_dir: require(&self.output_dir, "output_dir", TASK)?,
            language: self.subtitle_language.clone(),
            chunk_size: self.chunk_size,
            categories: self.categories.clone(),
        })
    }

    pub fn training_settings(&self) -> Result<TrainingSettings> {
        const TASK: &str = "train";
        let use_lora = require(&self.use_lora, "use_lora", TASK)?;
        let lora = if use_lora {
            Some(LoraSettings {
                r: require(&self.lora_r, "lora_r", TASK)?,
                alpha: require(&self.lora_alpha, "lora_alpha", TASK)?,
                dropout: require(&self.lora_dropout, "lora_dropout", TASK)?,
            })
        } else {
            None
        };

        Ok(TrainingSettings {
            model_name: self.model_name.clone(),
            train_data_path: require(&self.train_data_path, "train_data_path", TASK)?,
            val_data_path: require(&self.val_data_path, "val_data_path", TASK)?,
            save_dir: require(&self.save_dir, "save_dir", TASK)?,
            lora,
            batch_size: require(&self.batch_size, "batch_size", TASK)?,
            num_epochs: require(&self.num_epochs, "num_epochs", TASK)?,
            learning_rate: require(&self.learning_rate, "learning_rate", TASK)?,
            weight_decay: require(&self.weight_decay, "weight_decay", TASK)?,
            logging_steps: self.logging_steps,
            save_total_limit: self.save_total_limit,
            labels: self.categories.names(),
        })
    }

    /// Settings for the `augment` task; CLI paths take precedence over the file.
    pub fn augmentation_settings(
        &self,
        input_override: Option<&Path>,
        output_override: Option<&Path>,
    ) -> Result<AugmentationSettings> {
        const TASK: &str = "augment";
        let section = self.augmentation.as_ref().ok_or_else(|| PipelineError::MissingField {
            field: "augmentation".to_string(),
            task: TASK.to_string(),
        })?;

        let input_path = match input_override {
            Some(path) => path.to_path_buf(),
            None => require(&section.input_path, "augmentation.input_path", TASK)?,
        };
        let output_path = match output_override {
            Some(path) => path.to_path_buf(),
            None => require(&section.output_path, "augmentation.output_path", TASK)?,
        };

        Ok(AugmentationSettings {
            input_path,
            output_path,
            min_examples: require(&section.min_examples, "augmentation.min_examples", TASK)?,
            bt_rounds: require(&section.bt_rounds, "augmentation.bt_rounds", TASK)?,
            bt_beam_size: require(&section.bt_beam_size, "augmentation.bt_beam_size", TASK)?,
            source_language: section.source_language.clone(),
            pivot_language: section.pivot_language.clone(),
            categories: self.categories.names(),
        })
    }

    /// Settings for the `eda` task; defaults to the scraped dataset.
    pub fn report_settings(&self, input_override: Option<&Path>) -> Result<ReportSettings> {
        let dataset_path = match input_override {
            Some(path) => path.to_path_buf(),
            None => require(&self.output_dir, "output_dir", "eda")?.join("dataset.json"),
        };
        Ok(ReportSettings {
            dataset_path,
            categories: self.categories.names(),
        })
    }
}

/// Substitute `${VAR}` placeholders in every string of a YAML tree.
///
/// Unset variables are left as written. Substituted values stay strings;
/// numeric and boolean fields parse them when the config is deserialized.
pub fn resolve_env_vars<F>(value: Value, lookup: &F) -> Value
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        Value::Mapping(mapping) => Value::Mapping(
            mapping
                .into_iter()
                .map(|(key, value)| (key, resolve_env_vars(value, lookup)))
                .collect(),
        ),
        Value::Sequence(items) => Value::Sequence(
            items
                .into_iter()
                .map(|item| resolve_env_vars(item, lookup))
                .collect(),
        ),
        Value::String(text) => {
            if ENV_PLACEHOLDER.is_match(&text) {
                Value::String(interpolate(&text, lookup))
            } else {
                Value::String(text)
            }
        }
        other => other,
    }
}

fn interpolate<F>(text: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    ENV_PLACEHOLDER
        .replace_all(text, |caps: &Captures| {
            lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
