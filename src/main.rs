use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::{error, info};

use image_migrate::config::{MigrationConfig, Overrides};
use image_migrate::migration::{PassKind, PathResolver};
use image_migrate::util::env;
use image_migrate::{cli, tracing::init_tracing};

#[derive(Parser, Debug)]
#[command(
    name = "imgmig",
    version,
    about = "Copy images referenced by the image table into the destination bucket"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PassArg {
    ImagePath,
    Source,
    Both,
}

impl PassArg {
    fn kinds(self) -> Vec<PassKind> {
        match self {
            PassArg::ImagePath => vec![PassKind::ImagePath],
            PassArg::Source => vec![PassKind::Source],
            PassArg::Both => PassKind::ALL.to_vec(),
        }
    }
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Page through the image table, re-upload every reachable image and export audit CSVs
    Run {
        /// Which column to migrate
        #[arg(long, value_enum, default_value = "both")]
        pass: PassArg,
        /// Override DATABASE_URL / DB_* variables
        #[arg(long)]
        db_url: Option<String>,
        /// Rows per page (overrides BATCH_SIZE)
        #[arg(long)]
        batch_size: Option<u64>,
        /// Where chunk CSVs (and checkpoints) are written (overrides OUTPUT_DIR)
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Staging root for downloads (overrides UPLOAD_DIR)
        #[arg(long)]
        upload_dir: Option<PathBuf>,
        /// Resolve and probe only; nothing is downloaded or uploaded
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Rewrite the migrated column to the canonical key after upload
        #[arg(long, default_value_t = false)]
        update_db: bool,
        /// Continue each pass from its saved checkpoint
        #[arg(long, default_value_t = false)]
        resume: bool,
        /// Stop each pass after this many batches
        #[arg(long)]
        max_batches: Option<u64>,
    },
    /// Print how raw image_path/source values resolve
    Resolve {
        /// Storage provider domain (overrides STORAGE_DOMAIN)
        #[arg(long)]
        domain: Option<String>,
        #[arg(required = true)]
        inputs: Vec<String>,
    },
}

fn flag(cli_value: bool) -> Option<bool> {
    // Flags only ever switch a feature on; absent means "ask the environment".
    cli_value.then_some(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    env::init_env();
    init_tracing("info", true)?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            pass,
            db_url,
            batch_size,
            output_dir,
            upload_dir,
            dry_run,
            update_db,
            resume,
            max_batches,
        } => {
            env::preflight_check(
                "run",
                &[],
                &[
                    "DATABASE_URL",
                    "DB_HOST",
                    "DB_NAME",
                    "BATCH_SIZE",
                    "DESTINATION_BUCKET",
                    "DESTINATION_BUCKET_REGION",
                    "DESTINATION_BUCKET_ACCESS_KEY",
                    "DESTINATION_BUCKET_SECRET_KEY",
                ],
            )?;
            let cfg = MigrationConfig::from_env(Overrides {
                database_url: db_url,
                page_size: batch_size,
                output_dir,
                upload_dir,
                passes: Some(pass.kinds()),
                dry_run: flag(dry_run),
                update_db: flag(update_db),
                resume: flag(resume),
                max_batches,
            })?;

            let reports = cli::migrate::run(&cfg).await?;
            let aborted: Vec<String> = reports
                .iter()
                .filter(|r| r.is_aborted())
                .map(|r| r.to_string())
                .collect();
            let total: u64 = reports.iter().map(|r| r.records).sum();
            let migrated: u64 = reports.iter().map(|r| r.migrated).sum();
            info!(
                passes = reports.len(),
                records = total,
                migrated,
                "all batches for the selected passes processed"
            );
            if !aborted.is_empty() {
                for line in &aborted {
                    error!("{line}");
                }
                bail!("{} pass(es) aborted", aborted.len());
            }
        }
        Commands::Resolve { domain, inputs } => {
            let domain = domain
                .or_else(|| env::env_opt("STORAGE_DOMAIN"))
                .unwrap_or_else(|| {
                    image_migrate::migration::path_resolver::DEFAULT_STORAGE_DOMAIN.to_string()
                });
            let out = cli::resolve::run(&PathResolver::new(domain), &inputs)?;
            print!("{out}");
        }
    }
    Ok(())
}
