use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

#[derive(Clone)]
pub struct S3Service {
    client: Client,
    bucket_name: String,
    public_base_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum S3ServiceError {
    #[error("S3 error: {0}")]
    S3(String),
    #[error("Unsupported image format: {0}")]
    InvalidFormat(String),
    #[error("File too large: {0} bytes")]
    FileTooLarge(usize),
    #[error("Image payload is empty")]
    EmptyFile,
}

impl S3Service {
    pub const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024;
    const KEY_PREFIX: &'static str = "scans";

    pub fn new(client: Client, bucket_name: String, public_base_url: String) -> Self {
        Self {
            client,
            bucket_name,
            public_base_url,
        }
    }

    /// Virtual-hosted bucket URL, used when no CDN/base URL is configured.
    pub fn default_public_base_url(bucket_name: &str, region: Option<&str>) -> String {
        match region {
            Some(region) => format!("https://{}.s3.{}.amazonaws.com", bucket_name, region),
            None => format!("https://{}.s3.amazonaws.com", bucket_name),
        }
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    pub fn public_base_url(&self) -> &str {
        &self.public_base_url
    }

    pub fn calculate_image_hash(image_data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(image_data);
        hex::encode(hasher.finalize())
    }

    /// `scans/<unix millis>-<file name>`; the time prefix keeps repeated names apart.
    pub fn generate_object_key(uploaded_at: DateTime<Utc>, file_name: &str) -> String {
        format!(
            "{}/{}-{}",
            Self::KEY_PREFIX,
            uploaded_at.timestamp_millis(),
            Self::sanitize_file_name(file_name)
        )
    }

    pub fn sanitize_file_name(file_name: &str) -> String {
        let base = file_name.rsplit(['/', '\\']).next().unwrap_or_default();
        let cleaned: String = base
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let cleaned = cleaned.trim_start_matches('.');
        if cleaned.is_empty() {
            "image".to_string()
        } else {
            cleaned.to_string()
        }
    }

    pub fn public_url_for(base_url: &str, s3_key: &str) -> Option<String> {
        let base_url = base_url.trim_end_matches('/');
        if base_url.is_empty() || s3_key.is_empty() {
            return None;
        }
        let path: Vec<String> = s3_key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        Some(format!("{}/{}", base_url, path.join("/")))
    }

    pub fn extract_file_extension(mime_type: &str) -> Result<&'static str, S3ServiceError> {
        match mime_type {
            "image/jpeg" | "image/jpg" => Ok("jpg"),
            "image/png" => Ok("png"),
            "image/webp" => Ok("webp"),
            "image/gif" => Ok("gif"),
            other => Err(S3ServiceError::InvalidFormat(other.to_string())),
        }
    }

    pub fn validate_image_size(image_data: &[u8]) -> Result<(), S3ServiceError> {
        if image_data.is_empty() {
            return Err(S3ServiceError::EmptyFile);
        }
        if image_data.len() > Self::MAX_IMAGE_BYTES {
            return Err(S3ServiceError::FileTooLarge(image_data.len()));
        }
        Ok(())
    }

    pub async fn upload_image(
        &self,
        image_data: &[u8],
        s3_key: &str,
        mime_type: &str,
    ) -> Result<(), S3ServiceError> {
        S3Service::validate_image_size(image_data)?;
        S3Service::extract_file_extension(mime_type)?;

        let body = ByteStream::from(image_data.to_vec());

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(s3_key)
            .body(body)
            .content_type(mime_type)
            .send()
            .await
            .map_err(|e| S3ServiceError::S3(e.to_string()))?;

        log::info!(
            "Uploaded {} bytes to s3://{}/{}",
            image_data.len(),
            self.bucket_name,
            s3_key
        );
        Ok(())
    }
}
