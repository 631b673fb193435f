use anyhow::{Context, Result};
use tracing::info;

use crate::config::MigrationConfig;
use crate::database_ops::db::Db;
use crate::database_ops::image_master::ImageTable;
use crate::migration::audit::AuditWriter;
use crate::migration::destination::S3Destination;
use crate::migration::remote::HttpFetcher;
use crate::migration::traits::ObjectSink;
use crate::migration::transfer::TransferWorker;
use crate::migration::PathResolver;
use crate::orchestrator::{BatchOrchestrator, PassReport, PassSettings};
use crate::util::env::redact_db_url;

/// Wire the production stores together and run every configured pass.
pub async fn run(cfg: &MigrationConfig) -> Result<Vec<PassReport>> {
    info!(
        db = %redact_db_url(&cfg.database_url),
        table = %cfg.image_table,
        page_size = cfg.page_size,
        output_dir = %cfg.output_dir.display(),
        upload_dir = %cfg.upload_dir.display(),
        dry_run = cfg.dry_run,
        update_db = cfg.update_db,
        resume = cfg.resume,
        "migrate: starting"
    );

    tokio::fs::create_dir_all(&cfg.output_dir)
        .await
        .with_context(|| format!("creating {}", cfg.output_dir.display()))?;
    tokio::fs::create_dir_all(&cfg.upload_dir)
        .await
        .with_context(|| format!("creating {}", cfg.upload_dir.display()))?;

    // Only one page query or write-back is ever in flight.
    let db = Db::connect(&cfg.database_url, 2)
        .await
        .context("connecting to source database")?;
    let table = ImageTable::new(db.clone(), &cfg.image_table, &cfg.source_pattern);

    let fetcher = HttpFetcher::new(cfg.http_timeout)?;
    let destination = match &cfg.destination {
        Some(dest) => {
            info!(bucket = %dest.bucket, region = %dest.region, "migrate: destination configured");
            Some(S3Destination::connect(dest).await)
        }
        None => None,
    };
    let sink = destination.as_ref().map(|d| d as &dyn ObjectSink);

    let orchestrator = BatchOrchestrator::new(
        &table,
        PathResolver::new(&cfg.storage_domain),
        TransferWorker::new(&fetcher, sink, &cfg.upload_dir),
        AuditWriter::new(&cfg.output_dir),
        PassSettings::from(cfg),
    );
    let reports = orchestrator.run_all(&cfg.passes).await;

    db.close().await;
    Ok(reports)
}
