//! Optional persisted cursor so an interrupted pass can pick up where it
//! stopped instead of starting again at offset 0.

use super::types::{BatchCursor, PassKind};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub pass: PassKind,
    pub next_offset: u64,
    pub next_batch: u64,
    pub page_size: u64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, kind: PassKind) -> PathBuf {
        self.dir.join(format!("checkpoint_{}.json", kind.tag()))
    }

    /// Cursor to start `kind` from. A checkpoint written with a different page
    /// size is ignored, since its offsets no longer line up with batch numbers.
    pub async fn load(&self, kind: PassKind, page_size: u64) -> Result<Option<BatchCursor>> {
        let path = self.path_for(kind);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        let cp: Checkpoint = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", path.display()))?;
        if cp.pass != kind || cp.page_size != page_size {
            warn!(
                file = %path.display(),
                saved_page_size = cp.page_size,
                page_size,
                "ignoring checkpoint written for a different pass or page size"
            );
            return Ok(None);
        }
        Ok(Some(BatchCursor {
            offset: cp.next_offset,
            page_size,
            batch_number: cp.next_batch,
        }))
    }

    /// Persist the cursor of the next page to process.
    pub async fn save(&self, kind: PassKind, next: &BatchCursor) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let cp = Checkpoint {
            pass: kind,
            next_offset: next.offset,
            next_batch: next.batch_number,
            page_size: next.page_size,
            updated_at: Utc::now(),
        };
        let path = self.path_for(kind);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&cp)?)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }

    pub async fn clear(&self, kind: PassKind) -> Result<()> {
        remove_if_present(&self.path_for(kind)).await
    }
}

async fn remove_if_present(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
    }
}
