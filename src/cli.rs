use clap::{Parser, ValueEnum};
use std::fmt;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Subtitle dataset builder and topic classifier trainer", long_about = None)]
pub struct Args {
    /// Pipeline task to run
    #[arg(short, long, value_enum)]
    pub task: Task,

    /// Configuration file path
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Override `model_name` from the configuration
    #[arg(short, long)]
    pub model: Option<String>,

    /// Input dataset (eda, augment)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Output dataset (augment)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Task {
    /// Download subtitles and build the chunked dataset
    Scrape,
    /// Summarize an existing dataset
    Eda,
    /// Fine-tune the classifier
    Train,
    /// Expand a dataset with back-translated paraphrases
    Augment,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Task::Scrape => "scrape",
            Task::Eda => "eda",
            Task::Train => "train",
            Task::Augment => "augment",
        };
        f.write_str(name)
    }
}
