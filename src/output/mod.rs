//! Output module for writing harvested records and reporting progress
//!
//! This module handles:
//! - The durable sink harvested records are appended to
//! - Recovery and duplicate suppression for the JSONL dataset file
//! - Harvest statistics from persisted state

mod jsonl;
pub mod stats;
mod traits;

pub use jsonl::JsonlSink;
pub use stats::{load_statistics, print_statistics, CollectionStatistics, HarvestStatistics};
pub use traits::{OutputError, OutputResult, OutputSink};
