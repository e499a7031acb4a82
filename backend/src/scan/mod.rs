pub mod events;
pub mod orchestrator;
pub mod review;

use shared::GeoFix;
use uuid::Uuid;

use crate::auth::models::Identity;

pub use events::{EventLog, LogObserver, ScanObserver};
pub use orchestrator::{ScanOrchestrator, ScanState, UploadedAsset};
pub use review::ReviewService;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Classification failed: {0}")]
    Classification(String),
    #[error("Upload failed: {0}")]
    Upload(String),
    #[error("Saving the scan failed: {0}")]
    Persist(String),
    #[error("Sign in required")]
    AuthRequired,
    #[error("Location unavailable: {0}")]
    LocationUnavailable(String),
    #[error("Scan {0} not found")]
    NotFound(Uuid),
}

/// Raw image as submitted by the user.
#[derive(Debug, Clone)]
pub struct ScanImage {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
}

impl ScanImage {
    pub fn new(bytes: Vec<u8>, file_name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            file_name: file_name.into(),
            mime_type: mime_type.into(),
        }
    }

    /// MIME type guessed from the magic bytes, for uploads sent without one.
    pub fn sniff_mime_type(bytes: &[u8]) -> Option<&'static str> {
        image::guess_format(bytes).ok().map(|format| format.to_mime_type())
    }
}

/// What the caller knows about the scan besides the image.
#[derive(Debug, Clone, Default)]
pub struct ScanContext {
    pub location: Option<GeoFix>,
    pub identity: Option<Identity>,
}
