//! Harvest orchestrator - main fetch-and-checkpoint logic
//!
//! Each collection moves through
//! `INIT → LISTING → ITEM_PROCESSING → BATCH_FLUSH → (LISTING | DONE | ABORTED)`,
//! with `INTERRUPTED` reachable at any item boundary.
//!
//! # Durability ordering
//!
//! A flush appends the buffered records to the sink (durable on return), then marks
//! each id processed, then persists the snapshot. The cursor moves past a page only
//! after that page's last flush. A crash between the sink write and the persist leaves
//! records the snapshot does not know about; the sink's `contains` check reconciles
//! them on the next run instead of emitting them twice.
//!
//! # Escalation
//!
//! Listing failures and item failures are counted separately. Only a successful
//! listing resets the listing count and only a fetched item resets the item count, so
//! an item endpoint outage aborts the collection even while listing keeps working.
//! Replaying the failed backlog never escalates: a backlog that keeps failing is left
//! for a later run and listing proceeds.

use crate::config::HarvestConfig;
use crate::harvest::report::{CollectionOutcome, CollectionReport, RunReport};
use crate::harvest::CancelFlag;
use crate::output::OutputSink;
use crate::remote::{IssueSource, RemoteError};
use crate::state::{CollectionKey, ItemId, ProgressStore};
use crate::transform::{FetchedItem, OutputRecord, Transformer};
use crate::HarvestError;
use std::collections::HashSet;
use std::fmt::Display;

/// Whether a collection may continue after a failure
enum Escalation {
    Continue,
    Abort(String),
}

/// What happened to one item
enum ItemOutcome {
    /// Fetched, transformed and buffered for the next flush
    Fetched,
    /// Already emitted, buffered or tried in this run
    Skipped,
    /// Fetch or transform failed; `retryable` failures stay in the backlog
    Failed { retryable: bool, error: String },
}

/// Per-collection working state for one run
struct CollectionRun {
    collection: CollectionKey,
    buffer: Vec<(ItemId, OutputRecord)>,
    buffered: HashSet<ItemId>,
    /// Items that already failed in this run
    failed: HashSet<ItemId>,
    listing_failures: u32,
    item_failures: u32,
    report: CollectionReport,
}

impl CollectionRun {
    fn new(collection: &CollectionKey) -> Self {
        Self {
            collection: collection.clone(),
            buffer: Vec::new(),
            buffered: HashSet::new(),
            failed: HashSet::new(),
            listing_failures: 0,
            item_failures: 0,
            report: CollectionReport::new(collection.clone()),
        }
    }
}

/// Drives harvesting of collections from an [`IssueSource`] into an [`OutputSink`]
pub struct Orchestrator<S, O> {
    source: S,
    sink: O,
    store: ProgressStore,
    transformer: Transformer,
    page_size: u32,
    batch_size: usize,
    failure_threshold: u32,
    cancel: CancelFlag,
}

impl<S, O> Orchestrator<S, O>
where
    S: IssueSource,
    O: OutputSink,
{
    /// Creates an orchestrator using the `[harvest]` settings
    pub fn new(source: S, sink: O, store: ProgressStore, config: &HarvestConfig) -> Self {
        Self {
            source,
            sink,
            store,
            transformer: Transformer::new(),
            page_size: config.page_size.max(1),
            batch_size: config.batch_size.max(1),
            failure_threshold: config.failure_threshold.max(1),
            cancel: CancelFlag::new(),
        }
    }

    /// Uses `cancel` as the interruption signal
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    pub fn sink(&self) -> &O {
        &self.sink
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Consumes the orchestrator, returning its parts
    pub fn into_parts(self) -> (S, O, ProgressStore) {
        (self.source, self.sink, self.store)
    }

    /// Harvests collections in order
    ///
    /// A collection abort is recorded in the report and the run moves on; an
    /// interruption stops the run after the current collection is checkpointed.
    ///
    /// # Errors
    ///
    /// Fatal state or output failures stop the run immediately.
    pub async fn run(&mut self, collections: &[CollectionKey]) -> Result<RunReport, HarvestError> {
        let mut report = RunReport::default();

        for collection in collections {
            let collection_report = self.harvest_collection(collection).await?;
            let interrupted = collection_report.outcome == CollectionOutcome::Interrupted;
            report.collections.push(collection_report);

            if interrupted {
                tracing::warn!("Run interrupted; state saved, run again to resume");
                break;
            }
        }

        Ok(report)
    }

    /// Harvests one collection until it is done, aborted or interrupted
    pub async fn harvest_collection(
        &mut self,
        collection: &CollectionKey,
    ) -> Result<CollectionReport, HarvestError> {
        let mut run = CollectionRun::new(collection);
        let mut cursor = self.store.cursor(collection);

        tracing::info!(
            "Harvesting {} from offset {} ({} items already processed)",
            collection,
            cursor,
            self.store.processed_count(collection)
        );

        if self.cancel.is_cancelled() {
            return self.finish(run, CollectionOutcome::Interrupted);
        }

        // INIT
        match self.source.describe_collection(collection).await {
            Ok(info) => {
                tracing::info!(
                    "Collection {} ({})",
                    collection,
                    info.name.as_deref().unwrap_or("unnamed")
                );
            }
            Err(e @ (RemoteError::Unavailable { .. } | RemoteError::Malformed { .. })) => {
                tracing::warn!("Could not describe {}: {}", collection, e);
            }
            Err(e) => {
                tracing::error!("Collection {} rejected: {}", collection, e);
                return self.finish(
                    run,
                    CollectionOutcome::Aborted {
                        reason: e.to_string(),
                    },
                );
            }
        }

        if !self.replay_backlog(&mut run).await? {
            return self.finish(run, CollectionOutcome::Interrupted);
        }
        self.flush(&mut run)?;

        loop {
            // LISTING
            if self.cancel.is_cancelled() {
                return self.finish(run, CollectionOutcome::Interrupted);
            }

            let page = match self
                .source
                .list_page(collection, cursor, self.page_size)
                .await
            {
                Ok(page) => {
                    run.listing_failures = 0;
                    page
                }
                Err(e) if e.is_unavailable() => {
                    tracing::warn!("Listing {} at offset {} failed: {}", collection, cursor, e);
                    let escalation =
                        self.escalate(&mut run.listing_failures, "listing", &e);
                    if let Escalation::Abort(reason) = escalation {
                        return self.finish(run, CollectionOutcome::Aborted { reason });
                    }
                    continue;
                }
                Err(e) => {
                    tracing::error!("Listing {} at offset {} failed: {}", collection, cursor, e);
                    return self.finish(
                        run,
                        CollectionOutcome::Aborted {
                            reason: e.to_string(),
                        },
                    );
                }
            };

            let page_len = page.items.len();
            let is_last = page.is_last(self.page_size);
            tracing::debug!(
                "Page of {} at offset {}: {} items{}",
                collection,
                cursor,
                page_len,
                if is_last { " (last)" } else { "" }
            );

            // ITEM_PROCESSING
            for item in page.items {
                if self.cancel.is_cancelled() {
                    return self.finish(run, CollectionOutcome::Interrupted);
                }
                match self.process_item(&mut run, item.id).await? {
                    ItemOutcome::Fetched => run.item_failures = 0,
                    ItemOutcome::Skipped => {}
                    ItemOutcome::Failed { error, .. } => {
                        let escalation = self.escalate(&mut run.item_failures, "item", &error);
                        if let Escalation::Abort(reason) = escalation {
                            return self.finish(run, CollectionOutcome::Aborted { reason });
                        }
                    }
                }
            }

            // BATCH_FLUSH at page end, then move past the page
            self.flush(&mut run)?;
            cursor = cursor.advanced_by(page_len);
            self.store.advance_cursor(collection, cursor)?;
            self.store.persist()?;

            if is_last {
                return self.finish(run, CollectionOutcome::Done);
            }
        }
    }

    /// Re-attempts items that failed in earlier runs
    ///
    /// Stops early once `failure_threshold` retryable failures happen in a row; the
    /// remaining ids stay in the backlog. Returns `false` when interrupted.
    async fn replay_backlog(&mut self, run: &mut CollectionRun) -> Result<bool, HarvestError> {
        let backlog = self.store.failed_items(&run.collection);
        if backlog.is_empty() {
            return Ok(true);
        }
        tracing::info!(
            "Retrying {} previously failed items of {}",
            backlog.len(),
            run.collection
        );

        let mut still_failing = 0;
        for id in backlog {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }
            match self.process_item(run, id).await? {
                ItemOutcome::Fetched => still_failing = 0,
                ItemOutcome::Skipped | ItemOutcome::Failed { retryable: false, .. } => {}
                ItemOutcome::Failed {
                    retryable: true, ..
                } => {
                    still_failing += 1;
                    if still_failing >= self.failure_threshold {
                        tracing::warn!(
                            "{}: {} backlog retries failed in a row, leaving the rest for a later run",
                            run.collection,
                            still_failing
                        );
                        break;
                    }
                }
            }
        }
        Ok(true)
    }

    /// Runs one item through skip checks, fetch and transform
    async fn process_item(
        &mut self,
        run: &mut CollectionRun,
        id: ItemId,
    ) -> Result<ItemOutcome, HarvestError> {
        let collection = run.collection.clone();

        if self.store.is_processed(&collection, &id)
            || run.buffered.contains(&id)
            || run.failed.contains(&id)
        {
            tracing::debug!("Skipping {} (already handled)", id);
            run.report.skipped += 1;
            return Ok(ItemOutcome::Skipped);
        }

        if self.sink.contains(&collection, &id) {
            tracing::info!("Output already holds {}, marking processed", id);
            self.store.mark_processed(&collection, id);
            run.report.skipped += 1;
            return Ok(ItemOutcome::Skipped);
        }

        match self.fetch_record(&collection, &id).await {
            Ok(record) => {
                run.buffered.insert(id.clone());
                run.buffer.push((id, record));
                if run.buffer.len() >= self.batch_size {
                    self.flush(run)?;
                }
                Ok(ItemOutcome::Fetched)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                let retryable = e.is_retryable();
                if retryable {
                    tracing::warn!("{} failed, kept for a later run: {}", id, e);
                    self.store.mark_failed(&collection, id.clone());
                } else {
                    tracing::warn!("{} failed permanently, skipping: {}", id, e);
                    self.store.clear_failed(&collection, &id);
                }
                run.failed.insert(id);
                run.report.failed += 1;
                Ok(ItemOutcome::Failed {
                    retryable,
                    error: e.to_string(),
                })
            }
        }
    }

    async fn fetch_record(
        &self,
        collection: &CollectionKey,
        id: &ItemId,
    ) -> Result<OutputRecord, HarvestError> {
        let detail = self.source.fetch_detail(id).await?;
        let sub_resources = self.source.fetch_sub_resources(id).await?;

        let item = FetchedItem {
            collection: collection.clone(),
            detail,
            sub_resources,
        };
        Ok(self.transformer.transform(&item)?)
    }

    /// Counts a failure and decides whether the collection must stop
    fn escalate(&self, failures: &mut u32, stage: &str, error: &dyn Display) -> Escalation {
        *failures += 1;
        tracing::debug!(
            "{} failure {}/{}",
            stage,
            *failures,
            self.failure_threshold
        );

        if *failures >= self.failure_threshold {
            Escalation::Abort(format!(
                "{} consecutive {} failures, last: {}",
                *failures, stage, error
            ))
        } else {
            Escalation::Continue
        }
    }

    /// Writes buffered records, marks them processed, then persists
    fn flush(&mut self, run: &mut CollectionRun) -> Result<(), HarvestError> {
        if run.buffer.is_empty() {
            return Ok(());
        }

        let (ids, records): (Vec<ItemId>, Vec<OutputRecord>) = run.buffer.drain(..).unzip();
        self.sink.append_batch(&records)?;

        for id in ids {
            run.buffered.remove(&id);
            self.store.mark_processed(&run.collection, id);
        }
        self.store.persist()?;

        run.report.emitted += records.len();
        tracing::info!(
            "Flushed {} records for {} ({} emitted this run)",
            records.len(),
            run.collection,
            run.report.emitted
        );
        Ok(())
    }

    /// Flushes, persists and closes out a collection
    fn finish(
        &mut self,
        mut run: CollectionRun,
        outcome: CollectionOutcome,
    ) -> Result<CollectionReport, HarvestError> {
        self.flush(&mut run)?;
        self.store.persist()?;

        match &outcome {
            CollectionOutcome::Done => tracing::info!(
                "Finished {}: {} emitted, {} skipped, {} failed",
                run.collection,
                run.report.emitted,
                run.report.skipped,
                run.report.failed
            ),
            CollectionOutcome::Aborted { reason } => {
                tracing::error!("Aborted {}: {}", run.collection, reason)
            }
            CollectionOutcome::Interrupted => tracing::warn!(
                "Interrupted {} at offset {}",
                run.collection,
                self.store.cursor(&run.collection)
            ),
        }

        run.report.outcome = outcome;
        Ok(run.report)
    }
}
