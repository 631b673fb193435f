use super::types::{AuditRow, PassKind};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes one CSV chunk per page under `output_dir`.
#[derive(Debug, Clone)]
pub struct AuditWriter {
    output_dir: PathBuf,
}

impl AuditWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn chunk_path(&self, kind: PassKind, batch_number: u64) -> PathBuf {
        self.output_dir.join(kind.chunk_file_name(batch_number))
    }

    /// Header plus `rows` in the given order. Overwrites an existing chunk of
    /// the same batch number.
    pub async fn write_chunk(
        &self,
        kind: PassKind,
        batch_number: u64,
        rows: &[AuditRow],
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("creating {}", self.output_dir.display()))?;
        let path = self.chunk_path(kind, batch_number);

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(kind.csv_header())?;
        for row in rows {
            writer.write_record(row.as_record())?;
        }
        let body = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("encoding chunk {}: {}", path.display(), e.error()))?;
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        info!(
            pass = %kind,
            batch = batch_number,
            rows = rows.len(),
            file = %path.display(),
            "chunk exported"
        );
        Ok(path)
    }
}
