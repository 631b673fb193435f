//! Per-record download → upload step.
//!
//! A successful transfer removes its staging file. Failed transfers leave
//! whatever was written in place so partial downloads can be inspected.

use super::traits::{ObjectSink, RemoteFetcher};
use super::types::{RecordOutcome, ResolvedReference, SkipReason, TransferError};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

pub struct TransferWorker<'a> {
    fetcher: &'a dyn RemoteFetcher,
    /// `None` runs in dry-run mode: probe only.
    sink: Option<&'a dyn ObjectSink>,
    staging_root: PathBuf,
}

impl<'a> TransferWorker<'a> {
    pub fn new(
        fetcher: &'a dyn RemoteFetcher,
        sink: Option<&'a dyn ObjectSink>,
        staging_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            sink,
            staging_root: staging_root.into(),
        }
    }

    pub async fn transfer(&self, reference: &ResolvedReference) -> RecordOutcome {
        if !reference.is_transferable() {
            return RecordOutcome::Skipped(SkipReason::Unresolvable);
        }
        let url = reference.fetchable_url.as_str();

        let Some(staging) = staging_path(&self.staging_root, &reference.canonical_key) else {
            return RecordOutcome::Failed(TransferError::UnsafeKey(
                reference.canonical_key.clone(),
            ));
        };

        match self.fetcher.exists(url).await {
            Ok(true) => {}
            Ok(false) => return RecordOutcome::Skipped(SkipReason::NotFound),
            Err(e) => return RecordOutcome::Skipped(SkipReason::ProbeFailed(format!("{e:#}"))),
        }

        let Some(sink) = self.sink else {
            return RecordOutcome::Skipped(SkipReason::DryRun);
        };

        if let Some(parent) = staging.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return RecordOutcome::Failed(TransferError::Staging {
                    path: parent.display().to_string(),
                    message: e.to_string(),
                });
            }
        }

        let bytes = match self.fetcher.download(url, &staging).await {
            Ok(n) => n,
            Err(e) => {
                return RecordOutcome::Failed(TransferError::Download {
                    url: url.to_string(),
                    message: format!("{e:#}"),
                })
            }
        };
        debug!(url, path = %staging.display(), bytes, "downloaded");

        let body = match tokio::fs::read(&staging).await {
            Ok(b) => b,
            Err(e) => {
                return RecordOutcome::Failed(TransferError::Staging {
                    path: staging.display().to_string(),
                    message: e.to_string(),
                })
            }
        };

        let key = reference.destination_key();
        if let Err(e) = sink.put(&key, body).await {
            return RecordOutcome::Failed(TransferError::Upload {
                key,
                message: format!("{e:#}"),
            });
        }
        info!(key = %key, "uploaded");

        if let Err(e) = tokio::fs::remove_file(&staging).await {
            warn!(path = %staging.display(), error = %e, "could not remove staging file");
        }
        RecordOutcome::Migrated
    }
}

/// Staging location mirroring `key` under `root`. `None` when the key is empty
/// or would escape the root.
pub fn staging_path(root: &Path, key: &str) -> Option<PathBuf> {
    let mut out = root.to_path_buf();
    let mut pushed = false;
    for segment in key.split('/').filter(|s| !s.is_empty() && *s != ".") {
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => {
                out.push(part);
                pushed = true;
            }
            _ => return None,
        }
    }
    pushed.then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::path_resolver::PathResolver;
    use crate::migration::testing::{FakeFetcher, FakeSink};
    use tempfile::TempDir;

    const URL: &str = "https://my-bucket.s3.amazonaws.com/public/images/a.jpg";

    fn reference() -> ResolvedReference {
        PathResolver::default().resolve(URL)
    }

    #[tokio::test]
    async fn successful_transfer_uploads_under_public_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let fetcher = FakeFetcher::default().with_object(URL, b"jpeg-bytes");
        let sink = FakeSink::default();
        let worker = TransferWorker::new(&fetcher, Some(&sink), dir.path());

        let outcome = worker.transfer(&reference()).await;

        assert_eq!(outcome, RecordOutcome::Migrated);
        assert_eq!(sink.keys(), vec!["public/images/a.jpg".to_string()]);
        assert_eq!(
            sink.stored.lock().unwrap()["public/images/a.jpg"],
            b"jpeg-bytes".to_vec()
        );
        assert!(!dir.path().join("images/a.jpg").exists());
    }

    #[tokio::test]
    async fn missing_object_creates_no_staging_file() {
        let dir = TempDir::new().unwrap();
        let fetcher = FakeFetcher::default();
        let sink = FakeSink::default();
        let worker = TransferWorker::new(&fetcher, Some(&sink), dir.path());

        let outcome = worker.transfer(&reference()).await;

        assert_eq!(outcome, RecordOutcome::Skipped(SkipReason::NotFound));
        assert_eq!(fetcher.download_count(), 0);
        assert!(sink.keys().is_empty());
        assert!(!dir.path().join("images").exists());
    }

    #[tokio::test]
    async fn probe_error_is_a_skip() {
        let dir = TempDir::new().unwrap();
        let mut fetcher = FakeFetcher::default().with_object(URL, b"x");
        fetcher.probe_errors.insert(URL.to_string());
        let worker = TransferWorker::new(&fetcher, None, dir.path());

        let outcome = worker.transfer(&reference()).await;
        assert!(matches!(
            outcome,
            RecordOutcome::Skipped(SkipReason::ProbeFailed(_))
        ));
    }

    #[tokio::test]
    async fn unresolvable_reference_never_touches_the_network() {
        let dir = TempDir::new().unwrap();
        let fetcher = FakeFetcher::default();
        let worker = TransferWorker::new(&fetcher, None, dir.path());

        let outcome = worker
            .transfer(&PathResolver::default().resolve("loose-file.jpg"))
            .await;
        assert_eq!(outcome, RecordOutcome::Skipped(SkipReason::Unresolvable));
        assert!(fetcher.probes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_upload_keeps_staging_file() {
        let dir = TempDir::new().unwrap();
        let fetcher = FakeFetcher::default().with_object(URL, b"jpeg-bytes");
        let sink = FakeSink {
            fail: true,
            ..Default::default()
        };
        let worker = TransferWorker::new(&fetcher, Some(&sink), dir.path());

        let outcome = worker.transfer(&reference()).await;

        assert!(matches!(
            outcome,
            RecordOutcome::Failed(TransferError::Upload { .. })
        ));
        assert!(dir.path().join("images/a.jpg").exists());
    }

    #[tokio::test]
    async fn failed_download_leaves_partial_file_and_skips_upload() {
        let dir = TempDir::new().unwrap();
        let mut fetcher = FakeFetcher::default().with_object(URL, b"jpeg-bytes");
        fetcher.download_errors.insert(URL.to_string());
        let sink = FakeSink::default();
        let worker = TransferWorker::new(&fetcher, Some(&sink), dir.path());

        let outcome = worker.transfer(&reference()).await;

        assert!(matches!(
            outcome,
            RecordOutcome::Failed(TransferError::Download { .. })
        ));
        assert!(sink.keys().is_empty());
        assert!(dir.path().join("images/a.jpg").exists());
    }

    #[tokio::test]
    async fn dry_run_probes_but_does_not_download() {
        let dir = TempDir::new().unwrap();
        let fetcher = FakeFetcher::default().with_object(URL, b"jpeg-bytes");
        let worker = TransferWorker::new(&fetcher, None, dir.path());

        assert_eq!(
            worker.transfer(&reference()).await,
            RecordOutcome::Skipped(SkipReason::DryRun)
        );
        assert_eq!(fetcher.download_count(), 0);
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        let fetcher = FakeFetcher::default();
        let sink = FakeSink::default();
        let worker = TransferWorker::new(&fetcher, Some(&sink), dir.path());

        let outcome = worker
            .transfer(&PathResolver::default().resolve("my-bucket/../../etc/passwd"))
            .await;
        assert!(matches!(
            outcome,
            RecordOutcome::Failed(TransferError::UnsafeKey(_))
        ));
        assert!(fetcher.probes.lock().unwrap().is_empty());
    }

    #[test]
    fn staging_paths_mirror_keys() {
        let root = Path::new("/tmp/upload");
        assert_eq!(
            staging_path(root, "images/2020/a.jpg"),
            Some(PathBuf::from("/tmp/upload/images/2020/a.jpg"))
        );
        assert_eq!(
            staging_path(root, "images//./a.jpg"),
            Some(PathBuf::from("/tmp/upload/images/a.jpg"))
        );
        assert_eq!(staging_path(root, "images/../../x"), None);
        assert_eq!(staging_path(root, ""), None);
    }
}
