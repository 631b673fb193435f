//! In-memory stand-ins for the stores, shared by the pipeline tests.

use super::traits::{ObjectSink, RecordSource, RemoteFetcher};
use super::types::{PassKind, SourceRecord};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// Applies the same selection as the image table: non-null values, and for
/// the source pass only values containing `source_pattern` (a `LIKE '%..%'`).
/// `write_back` rewrites the stored value, so later pages see the change.
#[derive(Default)]
pub struct FakeSource {
    pub rows: Mutex<HashMap<PassKind, Vec<SourceRecord>>>,
    pub source_pattern: Option<String>,
    /// Fetching this (kind, offset) fails like an unreachable database.
    pub fail_at: Option<(PassKind, u64)>,
    pub fail_write_back: bool,
    pub fetches: Mutex<Vec<(PassKind, u64, u64)>>,
    pub write_backs: Mutex<Vec<(PassKind, String, String)>>,
}

impl FakeSource {
    pub fn with_rows(kind: PassKind, rows: Vec<SourceRecord>) -> Self {
        let src = Self::default();
        src.insert_rows(kind, rows);
        src
    }

    pub fn insert_rows(&self, kind: PassKind, rows: Vec<SourceRecord>) {
        self.rows.lock().unwrap().insert(kind, rows);
    }

    pub fn fetch_count(&self, kind: PassKind) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _, _)| *k == kind)
            .count()
    }

    fn selects(&self, kind: PassKind, record: &SourceRecord) -> bool {
        let Some(value) = record.raw_path.as_deref() else {
            return false;
        };
        match (kind, &self.source_pattern) {
            (PassKind::Source, Some(pattern)) => value.contains(pattern.as_str()),
            _ => true,
        }
    }
}

#[async_trait]
impl RecordSource for FakeSource {
    async fn fetch_page(
        &self,
        kind: PassKind,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<SourceRecord>> {
        self.fetches.lock().unwrap().push((kind, offset, limit));
        if self.fail_at == Some((kind, offset)) {
            bail!("connection refused");
        }
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .get(&kind)
            .map(|rows| {
                rows.iter()
                    .filter(|r| self.selects(kind, r))
                    .skip(offset as usize)
                    .take(limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn write_back(&self, kind: PassKind, id: &str, canonical_key: &str) -> Result<bool> {
        if self.fail_write_back {
            bail!("lock wait timeout");
        }
        self.write_backs
            .lock()
            .unwrap()
            .push((kind, id.to_string(), canonical_key.to_string()));
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows
            .get_mut(&kind)
            .and_then(|rows| rows.iter_mut().find(|r| r.id == id))
        else {
            return Ok(false);
        };
        row.raw_path = Some(canonical_key.to_string());
        Ok(self.selects(kind, row))
    }
}

#[derive(Default)]
pub struct FakeFetcher {
    pub objects: HashMap<String, Vec<u8>>,
    pub probe_errors: HashSet<String>,
    pub download_errors: HashSet<String>,
    pub delay: Option<Duration>,
    pub probes: Mutex<Vec<String>>,
    pub downloads: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn with_object(mut self, url: &str, body: &[u8]) -> Self {
        self.objects.insert(url.to_string(), body.to_vec());
        self
    }

    pub fn download_count(&self) -> usize {
        self.downloads.lock().unwrap().len()
    }
}

#[async_trait]
impl RemoteFetcher for FakeFetcher {
    async fn exists(&self, url: &str) -> Result<bool> {
        self.probes.lock().unwrap().push(url.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.probe_errors.contains(url) {
            bail!("dns error");
        }
        Ok(self.objects.contains_key(url))
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        self.downloads.lock().unwrap().push(url.to_string());
        if self.download_errors.contains(url) {
            // Leave a partial file behind like an interrupted stream would.
            tokio::fs::write(dest, b"partial").await?;
            bail!("connection reset");
        }
        let Some(body) = self.objects.get(url) else {
            bail!("404 Not Found");
        };
        tokio::fs::write(dest, body).await?;
        Ok(body.len() as u64)
    }
}

#[derive(Default)]
pub struct FakeSink {
    pub fail: bool,
    pub stored: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeSink {
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.stored.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectSink for FakeSink {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        if self.fail {
            bail!("AccessDenied");
        }
        self.stored.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }
}
