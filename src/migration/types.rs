use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which source column a pass migrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    ImagePath,
    Source,
}

impl PassKind {
    pub const ALL: [PassKind; 2] = [PassKind::ImagePath, PassKind::Source];

    /// Column in the image table holding the raw reference.
    pub fn column(&self) -> &'static str {
        match self {
            PassKind::ImagePath => "image_path",
            PassKind::Source => "source",
        }
    }

    /// Tag used in chunk and checkpoint file names.
    pub fn tag(&self) -> &'static str {
        self.column()
    }

    /// CSV header for this pass' audit chunks.
    pub fn csv_header(&self) -> [String; 4] {
        let tag = self.tag();
        [
            "id".to_string(),
            format!("{tag}_original"),
            format!("{tag}_bucket"),
            format!("sanitized_path_{tag}"),
        ]
    }

    pub fn chunk_file_name(&self, batch_number: u64) -> String {
        format!("export_images_batch_{}_{}.csv", self.tag(), batch_number)
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One row fetched from the source table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    pub id: String,
    pub raw_path: Option<String>,
}

impl SourceRecord {
    pub fn new(id: impl Into<String>, raw_path: Option<&str>) -> Self {
        Self {
            id: id.into(),
            raw_path: raw_path.map(str::to_string),
        }
    }

    pub fn raw(&self) -> &str {
        self.raw_path.as_deref().unwrap_or("")
    }
}

/// A raw reference resolved into bucket, canonical key and fetch URL.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ResolvedReference {
    pub bucket_name: String,
    /// Slash separated, no bucket prefix, no leading `public/`.
    pub canonical_key: String,
    pub fetchable_url: String,
}

/// Fixed namespace prefix of every object written to the destination bucket.
pub const DESTINATION_PREFIX: &str = "public/";

impl ResolvedReference {
    /// Whether a download/upload should be attempted at all.
    pub fn is_transferable(&self) -> bool {
        !self.bucket_name.is_empty()
            && !self.canonical_key.is_empty()
            && !self.fetchable_url.is_empty()
    }

    pub fn destination_key(&self) -> String {
        format!("{DESTINATION_PREFIX}{}", self.canonical_key)
    }
}

/// One line of a chunk export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRow {
    pub id: String,
    pub original_value: String,
    pub derived_bucket: String,
    pub canonical_key: String,
}

impl AuditRow {
    pub fn new(record: &SourceRecord, resolved: &ResolvedReference) -> Self {
        Self {
            id: record.id.clone(),
            original_value: record.raw().to_string(),
            derived_bucket: resolved.bucket_name.clone(),
            canonical_key: resolved.canonical_key.clone(),
        }
    }

    pub fn as_record(&self) -> [&str; 4] {
        [
            self.id.as_str(),
            self.original_value.as_str(),
            self.derived_bucket.as_str(),
            self.canonical_key.as_str(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No bucket (or no key) could be derived; audit only.
    Unresolvable,
    /// The existence probe answered "not there".
    NotFound,
    /// The probe itself failed; treated like not-found.
    ProbeFailed(String),
    /// The record's pipeline exceeded the per-record deadline.
    TimedOut,
    DryRun,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unresolvable => f.write_str("unresolvable bucket"),
            SkipReason::NotFound => f.write_str("remote object not found"),
            SkipReason::ProbeFailed(msg) => write!(f, "probe failed: {msg}"),
            SkipReason::TimedOut => f.write_str("record timed out"),
            SkipReason::DryRun => f.write_str("dry run"),
        }
    }
}

/// Stage of a record's pipeline that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("download of {url} failed: {message}")]
    Download { url: String, message: String },
    #[error("upload of {key} failed: {message}")]
    Upload { key: String, message: String },
    #[error("staging file {path} unusable: {message}")]
    Staging { path: String, message: String },
    #[error("key `{0}` escapes the staging root")]
    UnsafeKey(String),
    #[error("write-back for id {id} failed: {message}")]
    WriteBack { id: String, message: String },
}

/// Per-record result; never propagated past the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Migrated,
    Skipped(SkipReason),
    Failed(TransferError),
}

impl RecordOutcome {
    pub fn is_migrated(&self) -> bool {
        matches!(self, RecordOutcome::Migrated)
    }
}

/// Offset/limit cursor of one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCursor {
    pub offset: u64,
    pub page_size: u64,
    pub batch_number: u64,
}

impl BatchCursor {
    pub fn start(page_size: u64) -> Self {
        Self {
            offset: 0,
            page_size,
            batch_number: 1,
        }
    }

    /// Move past the page just processed. Rows that dropped out of the
    /// selection (e.g. a write-back rewrote the filtered column) shift the
    /// remaining rows down, so the offset only skips the rows still selected.
    pub fn advance(&mut self, left_selection: u64) {
        self.offset += self.page_size.saturating_sub(left_selection);
        self.batch_number += 1;
    }
}
