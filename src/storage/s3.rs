use crate::error::{AppError, Result};
use crate::storage::ObjectStore;
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

/// S3 or S3-compatible bucket
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(
        bucket: String,
        endpoint: Option<String>,
        region: String,
        access_key: String,
        secret_key: String,
    ) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "portfolio-reports");

        let mut builder = aws_sdk_s3::Config::builder()
            .region(Region::new(region))
            .credentials_provider(credentials)
            .behavior_version(BehaviorVersion::latest());

        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket,
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn backend(&self) -> &'static str {
        "s3"
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("put s3://{}/{}: {}", self.bucket, key, e)))?;

        tracing::debug!("Uploaded {} bytes to s3://{}/{}", size, self.bucket, key);
        Ok(())
    }
}
