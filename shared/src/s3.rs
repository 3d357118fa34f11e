use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

use crate::error::StoreError;
use crate::store::BlobStore;

/// Blob Store backed by an S3 bucket. Locators are public object URLs.
pub struct S3BlobStore {
    client: S3Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

/// S3 key: plans/{uuid}.{ext}
fn object_key(suggested_name: &str) -> String {
    let extension = suggested_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
        .unwrap_or("bin");
    format!("plans/{}.{}", uuid::Uuid::new_v4(), extension)
}

impl BlobStore for S3BlobStore {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        suggested_name: &str,
        content_type: &str,
    ) -> Result<String, StoreError> {
        let key = object_key(suggested_name);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to upload to S3: {}", e)))?;

        Ok(format!("https://{}.s3.amazonaws.com/{}", self.bucket, key))
    }
}
