//! Run configuration, built once from env (+ CLI overrides) and passed by
//! reference to every component.

use crate::migration::destination::DestinationConfig;
use crate::migration::path_resolver::DEFAULT_STORAGE_DOMAIN;
use crate::migration::PassKind;
use crate::util::env as env_util;
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PAGE_SIZE: u64 = 500;
pub const DEFAULT_IMAGE_TABLE: &str = "image_master";
pub const DEFAULT_SOURCE_PATTERN: &str = "%s3.amazonaws%";

#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub database_url: String,
    pub image_table: String,
    /// `LIKE` pattern selecting rows for the source pass.
    pub source_pattern: String,
    pub page_size: u64,
    pub output_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub storage_domain: String,
    /// `None` in dry-run mode.
    pub destination: Option<DestinationConfig>,
    pub record_timeout: Duration,
    pub http_timeout: Duration,
    pub passes: Vec<PassKind>,
    pub dry_run: bool,
    pub update_db: bool,
    pub resume: bool,
    pub max_batches: Option<u64>,
}

/// CLI-side overrides; `None` falls back to env, then to the default.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub database_url: Option<String>,
    pub page_size: Option<u64>,
    pub output_dir: Option<PathBuf>,
    pub upload_dir: Option<PathBuf>,
    pub passes: Option<Vec<PassKind>>,
    pub dry_run: Option<bool>,
    pub update_db: Option<bool>,
    pub resume: Option<bool>,
    pub max_batches: Option<u64>,
}

impl MigrationConfig {
    pub fn from_env(overrides: Overrides) -> Result<Self> {
        env_util::init_env();

        let database_url = match overrides.database_url {
            Some(url) => url,
            None => env_util::db_url()?,
        };
        let dry_run = overrides
            .dry_run
            .unwrap_or_else(|| env_util::env_flag("DRY_RUN", false));

        let destination = if dry_run {
            None
        } else {
            Some(DestinationConfig {
                bucket: env_util::env_req("DESTINATION_BUCKET")?,
                region: env_util::env_req("DESTINATION_BUCKET_REGION")?,
                access_key_id: env_util::env_opt("DESTINATION_BUCKET_ACCESS_KEY"),
                secret_access_key: env_util::env_opt("DESTINATION_BUCKET_SECRET_KEY"),
            })
        };

        let page_size = match overrides.page_size {
            Some(n) => n,
            None => env_util::env_parse("BATCH_SIZE")?.unwrap_or(DEFAULT_PAGE_SIZE),
        };
        let record_timeout = env_util::env_parse("RECORD_TIMEOUT_SECS")?.unwrap_or(120);
        let http_timeout = env_util::env_parse("HTTP_TIMEOUT_SECS")?.unwrap_or(60);
        let max_batches = match overrides.max_batches {
            Some(n) => Some(n),
            None => env_util::env_parse("MAX_BATCHES")?,
        };

        let cfg = Self {
            database_url,
            image_table: env_util::env_opt("IMAGE_TABLE")
                .unwrap_or_else(|| DEFAULT_IMAGE_TABLE.to_string()),
            source_pattern: env_util::env_opt("SOURCE_URL_PATTERN")
                .unwrap_or_else(|| DEFAULT_SOURCE_PATTERN.to_string()),
            page_size,
            output_dir: overrides.output_dir.unwrap_or_else(|| {
                PathBuf::from(env_util::env_opt("OUTPUT_DIR").unwrap_or_else(|| "./csv".into()))
            }),
            upload_dir: overrides.upload_dir.unwrap_or_else(|| {
                PathBuf::from(env_util::env_opt("UPLOAD_DIR").unwrap_or_else(|| "./upload".into()))
            }),
            storage_domain: env_util::env_opt("STORAGE_DOMAIN")
                .unwrap_or_else(|| DEFAULT_STORAGE_DOMAIN.to_string()),
            destination,
            record_timeout: Duration::from_secs(record_timeout),
            http_timeout: Duration::from_secs(http_timeout),
            passes: overrides
                .passes
                .unwrap_or_else(|| PassKind::ALL.to_vec()),
            dry_run,
            update_db: overrides
                .update_db
                .unwrap_or_else(|| env_util::env_flag("UPDATE_DB", false)),
            resume: overrides
                .resume
                .unwrap_or_else(|| env_util::env_flag("RESUME", false)),
            max_batches,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            bail!("page size must be positive");
        }
        if !is_sql_identifier(&self.image_table) {
            bail!("IMAGE_TABLE `{}` is not a plain identifier", self.image_table);
        }
        if self.passes.is_empty() {
            bail!("no pass selected");
        }
        if self.record_timeout.is_zero() {
            bail!("record timeout must be positive");
        }
        if self.max_batches == Some(0) {
            bail!("max batches must be positive when set");
        }
        Ok(())
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`, optionally schema-qualified once.
pub fn is_sql_identifier(s: &str) -> bool {
    fn part(p: &str) -> bool {
        let mut chars = p.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
    match s.split_once('.') {
        Some((schema, table)) => part(schema) && part(table),
        None => part(s),
    }
}
