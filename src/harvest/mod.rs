//! Harvest module driving the fetch-and-checkpoint loop
//!
//! This module contains the orchestration logic, including:
//! - Paging through each collection from its persisted cursor
//! - Skipping items that were already emitted
//! - Batching output writes and checkpointing after each durable flush
//! - Escalating repeated failures into a collection abort
//! - Handling interrupts and resumption

mod orchestrator;
mod report;

pub use orchestrator::Orchestrator;
pub use report::{CollectionOutcome, CollectionReport, RunReport};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation request, checked at item boundaries and before each listing
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Sets `flag` when the process receives Ctrl-C
pub fn cancel_on_ctrl_c(flag: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current item");
            flag.cancel();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }
}
