//! Batch orchestrator: pages through the image table one pass at a time and
//! drives every record through resolve → probe → download → upload → audit.
//!
//! Records inside a page run strictly one after another so audit rows keep
//! the fetch order and at most one remote GET and one PUT are in flight.
//! Per-record problems end up in the record's outcome; only a failed page
//! fetch (or an unwritable chunk) ends a pass early, and it never affects the
//! other pass.

use crate::config::MigrationConfig;
use crate::migration::audit::AuditWriter;
use crate::migration::checkpoint::CheckpointStore;
use crate::migration::traits::RecordSource;
use crate::migration::transfer::TransferWorker;
use crate::migration::{
    AuditRow, BatchCursor, PassKind, PathResolver, RecordOutcome, SkipReason, SourceRecord,
    TransferError,
};
use std::fmt;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct PassSettings {
    pub page_size: u64,
    pub record_timeout: Duration,
    pub update_db: bool,
    pub resume: bool,
    pub max_batches: Option<u64>,
}

impl From<&MigrationConfig> for PassSettings {
    fn from(cfg: &MigrationConfig) -> Self {
        Self {
            page_size: cfg.page_size,
            record_timeout: cfg.record_timeout,
            update_db: cfg.update_db,
            resume: cfg.resume,
            max_batches: cfg.max_batches,
        }
    }
}

/// How a pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassState {
    /// An empty page was fetched.
    Done,
    /// The batch cap was reached before the table was exhausted.
    Stopped,
    Aborted(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub kind: PassKind,
    pub state: PassState,
    pub batches: u64,
    pub records: u64,
    pub migrated: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl PassReport {
    fn new(kind: PassKind) -> Self {
        Self {
            kind,
            state: PassState::Done,
            batches: 0,
            records: 0,
            migrated: 0,
            skipped: 0,
            failed: 0,
        }
    }

    fn tally(&mut self, outcome: &RecordOutcome) {
        self.records += 1;
        match outcome {
            RecordOutcome::Migrated => self.migrated += 1,
            RecordOutcome::Skipped(_) => self.skipped += 1,
            RecordOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.state, PassState::Aborted(_))
    }
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            PassState::Done => "done".to_string(),
            PassState::Stopped => "stopped at batch cap".to_string(),
            PassState::Aborted(e) => format!("aborted: {e}"),
        };
        write!(
            f,
            "{} pass {}: {} batches, {} records ({} migrated, {} skipped, {} failed)",
            self.kind, state, self.batches, self.records, self.migrated, self.skipped, self.failed
        )
    }
}

pub struct BatchOrchestrator<'a> {
    source: &'a dyn RecordSource,
    resolver: PathResolver,
    worker: TransferWorker<'a>,
    audit: AuditWriter,
    checkpoints: CheckpointStore,
    settings: PassSettings,
}

impl<'a> BatchOrchestrator<'a> {
    /// Checkpoints live next to the chunk files.
    pub fn new(
        source: &'a dyn RecordSource,
        resolver: PathResolver,
        worker: TransferWorker<'a>,
        audit: AuditWriter,
        settings: PassSettings,
    ) -> Self {
        let checkpoints = CheckpointStore::new(audit.output_dir());
        Self {
            source,
            resolver,
            worker,
            audit,
            checkpoints,
            settings,
        }
    }

    /// Run the given passes one after the other. Each pass starts from its own
    /// cursor and an aborted pass does not stop the next one.
    pub async fn run_all(&self, passes: &[PassKind]) -> Vec<PassReport> {
        let mut reports = Vec::with_capacity(passes.len());
        for &kind in passes {
            let report = self.run_pass(kind).await;
            if report.is_aborted() {
                error!(pass = %kind, "{report}");
            } else {
                info!(pass = %kind, "{report}");
            }
            reports.push(report);
        }
        reports
    }

    pub async fn run_pass(&self, kind: PassKind) -> PassReport {
        let mut report = PassReport::new(kind);
        let mut cursor = self.start_cursor(kind).await;

        loop {
            info!(
                pass = %kind,
                batch = cursor.batch_number,
                offset = cursor.offset,
                "fetching page"
            );
            let page = match self
                .source
                .fetch_page(kind, cursor.offset, cursor.page_size)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    error!(pass = %kind, offset = cursor.offset, error = %format!("{e:#}"), "page fetch failed");
                    report.state = PassState::Aborted(format!("{e:#}"));
                    return report;
                }
            };
            if page.is_empty() {
                info!(pass = %kind, offset = cursor.offset, "no more records");
                if self.settings.resume {
                    if let Err(e) = self.checkpoints.clear(kind).await {
                        warn!(pass = %kind, error = %format!("{e:#}"), "could not clear checkpoint");
                    }
                }
                report.state = PassState::Done;
                return report;
            }

            let mut rows = Vec::with_capacity(page.len());
            let mut left_selection = 0;
            for record in &page {
                let processed = self.process_record(kind, record).await;
                report.tally(&processed.outcome);
                if processed.left_selection {
                    left_selection += 1;
                }
                rows.push(processed.row);
            }

            if let Err(e) = self
                .audit
                .write_chunk(kind, cursor.batch_number, &rows)
                .await
            {
                error!(pass = %kind, batch = cursor.batch_number, error = %format!("{e:#}"), "chunk export failed");
                report.state = PassState::Aborted(format!("{e:#}"));
                return report;
            }
            report.batches += 1;
            info!(
                pass = %kind,
                batch = cursor.batch_number,
                records = page.len(),
                "batch processed"
            );

            if left_selection > 0 {
                info!(pass = %kind, rows = left_selection, "rows rewritten out of the selection");
            }
            cursor.advance(left_selection);
            if self.settings.resume {
                if let Err(e) = self.checkpoints.save(kind, &cursor).await {
                    warn!(pass = %kind, error = %format!("{e:#}"), "could not save checkpoint");
                }
            }
            if self
                .settings
                .max_batches
                .is_some_and(|cap| report.batches >= cap)
            {
                info!(pass = %kind, batches = report.batches, "batch cap reached");
                report.state = PassState::Stopped;
                return report;
            }
        }
    }

    async fn start_cursor(&self, kind: PassKind) -> BatchCursor {
        let fresh = BatchCursor::start(self.settings.page_size);
        if !self.settings.resume {
            return fresh;
        }
        match self.checkpoints.load(kind, self.settings.page_size).await {
            Ok(Some(cursor)) => {
                info!(
                    pass = %kind,
                    offset = cursor.offset,
                    batch = cursor.batch_number,
                    "resuming from checkpoint"
                );
                cursor
            }
            Ok(None) => fresh,
            Err(e) => {
                warn!(pass = %kind, error = %format!("{e:#}"), "unreadable checkpoint; starting at offset 0");
                fresh
            }
        }
    }

    /// Always yields an audit row, whatever happened to the transfer.
    async fn process_record(&self, kind: PassKind, record: &SourceRecord) -> ProcessedRecord {
        let resolved = self.resolver.resolve(record.raw());
        let row = AuditRow::new(record, &resolved);

        if !resolved.is_transferable() {
            info!(pass = %kind, id = %record.id, "skipping record with missing bucket name");
            return ProcessedRecord {
                row,
                outcome: RecordOutcome::Skipped(SkipReason::Unresolvable),
                left_selection: false,
            };
        }
        info!(pass = %kind, id = %record.id, url = %resolved.fetchable_url, "processing record");

        let mut outcome =
            match tokio::time::timeout(self.settings.record_timeout, self.worker.transfer(&resolved))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => RecordOutcome::Skipped(SkipReason::TimedOut),
            };

        let mut left_selection = false;
        if outcome.is_migrated() && self.settings.update_db {
            match self
                .source
                .write_back(kind, &record.id, &resolved.canonical_key)
                .await
            {
                Ok(still_selected) => left_selection = !still_selected,
                Err(e) => {
                    outcome = RecordOutcome::Failed(TransferError::WriteBack {
                        id: record.id.clone(),
                        message: format!("{e:#}"),
                    });
                }
            }
        }

        match &outcome {
            RecordOutcome::Migrated => {
                info!(pass = %kind, id = %record.id, key = %resolved.canonical_key, "record migrated")
            }
            RecordOutcome::Skipped(reason) => {
                info!(pass = %kind, id = %record.id, reason = %reason, "record skipped")
            }
            RecordOutcome::Failed(err) => {
                warn!(pass = %kind, id = %record.id, error = %err, "record failed")
            }
        }
        ProcessedRecord {
            row,
            outcome,
            left_selection,
        }
    }
}

struct ProcessedRecord {
    row: AuditRow,
    outcome: RecordOutcome,
    /// A write-back moved the row out of the pass filter, so later pages
    /// shift down by one.
    left_selection: bool,
}
