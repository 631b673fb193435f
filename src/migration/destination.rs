//! Destination bucket client built on the AWS SDK.

use super::traits::ObjectSink;
use anyhow::Result;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::debug;

/// Where migrated objects land.
#[derive(Clone)]
pub struct DestinationConfig {
    pub bucket: String,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl std::fmt::Debug for DestinationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestinationConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id.as_ref().map(|_| "***"))
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "***"))
            .finish()
    }
}

pub struct S3Destination {
    client: S3Client,
    bucket: String,
}

impl S3Destination {
    /// Static credentials when both halves are configured, otherwise the
    /// default provider chain.
    pub async fn connect(cfg: &DestinationConfig) -> Self {
        let loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(cfg.region.clone()));

        let loader = match (&cfg.access_key_id, &cfg.secret_access_key) {
            (Some(access), Some(secret)) => loader.credentials_provider(Credentials::new(
                access,
                secret,
                None,
                None,
                "image-migrate",
            )),
            _ => loader,
        };

        let sdk_config = loader.load().await;
        Self {
            client: S3Client::new(&sdk_config),
            bucket: cfg.bucket.clone(),
        }
    }
}

#[async_trait]
impl ObjectSink for S3Destination {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        let len = body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| {
                anyhow::anyhow!(
                    "put s3://{}/{} failed: {}",
                    self.bucket,
                    key,
                    aws_sdk_s3::error::DisplayErrorContext(&err)
                )
            })?;
        debug!(bucket = %self.bucket, key, bytes = len, "object stored");
        Ok(())
    }
}
