// Pre-signed upload URLs for chat images on an S3-compatible bucket

use anyhow::{Context, Result};
use async_trait::async_trait;
use s3::{creds::Credentials, Bucket, Region};
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::images::UploadSigner;

pub struct S3UploadSigner {
    bucket: Bucket,
    expiry_secs: u32,
}

impl S3UploadSigner {
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let region = match &config.endpoint {
            Some(endpoint) => Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.trim_end_matches('/').to_string(),
            },
            None => config
                .region
                .parse()
                .with_context(|| format!("invalid bucket region {}", config.region))?,
        };

        let credentials = Credentials::new(
            config.access_key_id.as_deref(),
            config.secret_access_key.as_deref(),
            None,
            None,
            None,
        )
        .context("failed to load bucket credentials")?;

        let mut bucket = Bucket::new(&config.bucket, region, credentials)
            .with_context(|| format!("failed to open bucket {}", config.bucket))?;
        // S3-compatible endpoints (R2, MinIO) address buckets by path
        if config.endpoint.is_some() {
            bucket = bucket.with_path_style();
        }

        info!(
            bucket = %config.bucket,
            expiry_secs = config.upload_url_ttl_secs,
            "Image upload signer ready"
        );

        Ok(Self {
            bucket,
            expiry_secs: config.upload_url_ttl_secs,
        })
    }
}

#[async_trait]
impl UploadSigner for S3UploadSigner {
    async fn presign_upload(&self, key: &str) -> Result<String> {
        let url = self
            .bucket
            .presign_put(key, self.expiry_secs, None)
            .await
            .with_context(|| format!("failed to presign upload for {}", key))?;
        debug!(key, "Presigned image upload");
        Ok(url)
    }
}
