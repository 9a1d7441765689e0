use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::primitives::ByteStream;
use tokio::sync::Mutex;

use crate::error::PipelineError;

pub trait MediaStorage {
    /// Store `data` under `key` and return its public URL.
    fn upload(
        &self,
        key: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> impl Future<Output = Result<String, PipelineError>> + Send;
}

#[derive(Debug, Clone)]
pub struct S3MediaStorage {
    client: S3Client,
    bucket: String,
    public_base_url: String,
}

impl S3MediaStorage {
    pub fn new(
        client: S3Client,
        bucket: impl Into<String>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            public_base_url: public_base_url.into(),
        }
    }
}

/// `{base}/{key}` without doubled slashes.
#[must_use]
pub fn public_url(public_base_url: &str, key: &str) -> String {
    format!(
        "{}/{}",
        public_base_url.trim_end_matches('/'),
        key.trim_start_matches('/')
    )
}

impl MediaStorage for S3MediaStorage {
    #[tracing::instrument(skip(self, data), fields(bytes = data.len()))]
    async fn upload(
        &self,
        key: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<String, PipelineError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                tracing::error!("S3 PutObject error for key {}: {:?}", key, e);
                PipelineError::Media(e.to_string())
            })?;

        Ok(public_url(&self.public_base_url, key))
    }
}

/// In-process media storage for tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryMediaStorage {
    public_base_url: String,
    uploads: Mutex<Vec<(String, String, usize)>>,
}

impl MemoryMediaStorage {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            public_base_url: public_base_url.into(),
            uploads: Mutex::new(Vec::new()),
        }
    }

    /// `(key, content_type, size)` of every upload, in order.
    pub async fn uploads(&self) -> Vec<(String, String, usize)> {
        self.uploads.lock().await.clone()
    }
}

impl MediaStorage for MemoryMediaStorage {
    async fn upload(
        &self,
        key: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<String, PipelineError> {
        self.uploads.lock().await.push((
            key.to_string(),
            content_type.to_string(),
            data.len(),
        ));

        Ok(public_url(&self.public_base_url, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_url_joins_cleanly() {
        assert_eq!(
            public_url("https://media.example.com/", "/autopilot/a.png"),
            "https://media.example.com/autopilot/a.png"
        );
    }
}
