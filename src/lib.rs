//! subtune - subtitle dataset builder and topic classifier trainer
//!
//! Captions are scraped per category, cleaned and cut into token-sized
//! chunks, optionally expanded with back-translated paraphrases, and used to
//! fine-tune a sequence classifier.

pub mod augment;
pub mod chunk;
pub mod cli;
pub mod command;
pub mod config;
pub mod dataset;
pub mod error;
pub mod scrape;
pub mod subtitle;
pub mod train;
