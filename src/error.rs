use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing configuration field '{field}' required by the {task} task")]
    MissingField { field: String, task: String },

    #[error("Subtitle download error: {0}")]
    Scrape(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Translation error: {0}")]
    Translation(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unknown category '{0}' (not listed in the configuration)")]
    UnknownCategory(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
