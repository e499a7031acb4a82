pub mod s3_service;

use async_trait::async_trait;

pub use s3_service::{S3Service, S3ServiceError};

/// Object storage that can hand back a public URL for what it stores.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn put_object(
        &self,
        key: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<(), S3ServiceError>;

    /// `None` when the object has no publicly addressable location.
    fn public_url(&self, key: &str) -> Option<String>;
}

#[async_trait]
impl AssetStore for S3Service {
    async fn put_object(
        &self,
        key: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<(), S3ServiceError> {
        self.upload_image(bytes, key, mime_type).await
    }

    fn public_url(&self, key: &str) -> Option<String> {
        S3Service::public_url_for(self.public_base_url(), key)
    }
}
