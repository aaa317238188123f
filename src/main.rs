//! subtune - subtitle dataset builder and topic classifier trainer
//!
//! Downloads captions for categorized videos, turns them into a labeled
//! dataset, expands it with back-translation and fine-tunes a sequence
//! classifier on the result.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use subtune::augment::{AugmentationPipeline, BackTranslator, TranslatorFactory};
use subtune::chunk::HfTokenCodec;
use subtune::cli::{Args, Task};
use subtune::command::check_tool_available;
use subtune::config::Config;
use subtune::dataset::{load_dataset, DatasetBuilder, DatasetReport};
use subtune::scrape::SubtitleSourceFactory;
use subtune::train::Trainer;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    if let Some(model) = &args.model {
        config.model_name = model.clone();
    }

    let _guard = setup_logging(&config.log_level, &config.log_dir)?;
    config.log_ignored_keys();
    info!("Running task '{}' with config {}", args.task, args.config.display());

    let ok = match args.task {
        Task::Scrape => run_scrape(&config).await?,
        Task::Eda => run_eda(&config, &args).await?,
        Task::Augment => run_augment(&config, &args).await?,
        Task::Train => run_train(&config).await?,
    };

    if ok {
        info!("Task '{}' completed", args.task);
        Ok(ExitCode::SUCCESS)
    } else {
        error!("Task '{}' finished with errors", args.task);
        Ok(ExitCode::FAILURE)
    }
}

/// Console and daily-rotated file output, filtered by `RUST_LOG` or `level`.
///
/// The returned guard flushes the file writer when dropped.
fn setup_logging(level: &str, log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let file_appender = rolling::daily(log_dir, "subtune.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Invalid log level")?;

    let console_layer = fmt::layer().with_target(false);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - level: {}, file: {}", level, log_dir.join("subtune.log").display());
    Ok(guard)
}

async fn run_scrape(config: &Config) -> Result<bool> {
    let settings = config.scrape_settings()?;

    let source = SubtitleSourceFactory::create_default(&config.backends, &settings.subtitles_dir);
    source.check_availability().await?;

    info!("Loading tokenizer for {}", settings.model_name);
    let codec = HfTokenCodec::load(&settings.model_name)?;

    let builder = DatasetBuilder::new(settings, source, Box::new(codec));
    let report = builder.build_dataset().await;

    println!("\nDataset build summary:");
    println!("{:<22} {}", "URLs", report.total_urls);
    println!("{:<22} {}", "Subtitles downloaded", report.downloaded);
    println!("{:<22} {}", "Records", report.records);
    println!("{:<22} {}", "Skipped", report.skipped.len());
    for skipped in &report.skipped {
        println!("  [{}] {} ({})", skipped.category, skipped.url, skipped.reason);
    }
    match (&report.saved_to, &report.save_error) {
        (Some(path), _) => println!("Saved to {}", path.display()),
        (None, Some(e)) => println!("Dataset was not saved: {}", e),
        (None, None) => println!("No records collected, nothing saved"),
    }

    Ok(report.save_error.is_none())
}

async fn run_eda(config: &Config, args: &Args) -> Result<bool> {
    let settings = config.report_settings(args.input.as_deref())?;
    let records = load_dataset(&settings.dataset_path).await?;
    let report = DatasetReport::analyze(&records, &settings.categories);
    report.log_findings();

    println!("\nDataset: {} ({} records)", settings.dataset_path.display(), report.total);
    println!("{:<24} {:>8} {:>8}", "Category", "Records", "Share");
    println!("{}", "-".repeat(42));
    for stats in &report.categories {
        let marker = if stats.configured { "" } else { " *" };
        println!(
            "{:<24} {:>8} {:>7.1}%",
            format!("{}{}", stats.category, marker),
            stats.count,
            stats.share * 100.0
        );
    }
    println!(
        "\nText length (chars): min {}, mean {:.1}, max {}",
        report.text_length.min, report.text_length.mean, report.text_length.max
    );
    println!("Duplicates: {}, empty texts: {}", report.duplicates, report.empty_texts);
    if !report.unknown_categories().is_empty() {
        println!("* not listed in the configuration");
    }

    Ok(true)
}

async fn run_augment(config: &Config, args: &Args) -> Result<bool> {
    let settings = config.augmentation_settings(args.input.as_deref(), args.output.as_deref())?;

    let python = check_tool_available(&config.backends.python).await?;
    info!("Using {}", python);

    let translator = TranslatorFactory::create_default(&config.backends, settings.bt_beam_size).await?;
    let augmenter = BackTranslator::new(
        translator,
        settings.source_language.clone(),
        settings.pivot_language.clone(),
        settings.bt_rounds,
    );
    let min_examples = settings.min_examples;
    let mut pipeline = AugmentationPipeline::new(settings, augmenter);
    let result = pipeline.run().await;
    if let Err(e) = pipeline.into_augmenter().close().await {
        warn!("Translation worker did not shut down cleanly: {}", e);
    }
    let report = result?;

    println!("\nAugmentation summary:");
    println!("{:<22} {}", "Input records", report.input_records);
    println!("{:<22} {}", "Paraphrases added", report.paraphrases);
    println!("{:<22} {}", "Output records", report.output_records);
    println!("{:<22} {}", "Failed records", report.failed_records);
    for (category, count) in &report.counts {
        println!("  {:<20} {}", category, count);
    }
    if report.deficits.is_empty() {
        println!("Every category reaches {} records", min_examples);
    } else {
        for deficit in &report.deficits {
            println!(
                "Category '{}' needs {} more records to reach {}",
                deficit.category, deficit.missing, min_examples
            );
        }
    }
    match (&report.saved_to, &report.save_error) {
        (Some(path), _) => println!("Saved to {}", path.display()),
        (None, Some(e)) => println!("Augmented dataset was not saved: {}", e),
        (None, None) => {}
    }

    Ok(report.save_error.is_none())
}

async fn run_train(config: &Config) -> Result<bool> {
    let settings = config.training_settings()?;

    let python = check_tool_available(&config.backends.python).await?;
    info!("Using {}", python);

    let outcome = Trainer::new(settings, config.backends.clone()).run().await?;

    println!("\nTraining finished:");
    println!("{:<22} {}", "Training examples", outcome.train_examples);
    println!("{:<22} {}", "Validation examples", outcome.val_examples);
    println!("{:<22} {}", "Final model", outcome.final_model_dir.display());
    if let Some(adapter) = &outcome.adapter_dir {
        println!("{:<22} {}", "Adapter", adapter.display());
    }

    Ok(true)
}
