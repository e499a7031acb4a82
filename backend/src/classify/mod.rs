pub mod client;
pub mod config;
pub mod model;

use async_trait::async_trait;
use shared::Predictions;

use crate::scan::ScanImage;
use client::HttpClassifier;
use model::{InferenceError, Model};

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Classifier request failed: {0}")]
    Transport(String),
    #[error("Classifier returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Classifier reported an error: {0}")]
    Rejected(String),
    #[error("Invalid classifier response: {0}")]
    InvalidResponse(String),
    #[error("Invalid classifier endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),
}

/// Turns an image into a breed → confidence mapping.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, image: &ScanImage) -> Result<Predictions, ClassifierError>;
}

#[async_trait]
impl Classifier for Model {
    async fn classify(&self, image: &ScanImage) -> Result<Predictions, ClassifierError> {
        Ok(self.inference(&image.bytes).await?)
    }
}

/// In-process stub or a remote `/scan` endpoint, picked at startup.
#[derive(Clone)]
pub enum ClassifierBackend {
    Local(Model),
    Remote(HttpClassifier),
}

impl ClassifierBackend {
    pub fn describe(&self) -> String {
        match self {
            ClassifierBackend::Local(_) => "in-process stub model".to_string(),
            ClassifierBackend::Remote(client) => format!("remote classifier at {}", client.endpoint()),
        }
    }
}

#[async_trait]
impl Classifier for ClassifierBackend {
    async fn classify(&self, image: &ScanImage) -> Result<Predictions, ClassifierError> {
        match self {
            ClassifierBackend::Local(model) => model.classify(image).await,
            ClassifierBackend::Remote(client) => client.classify(image).await,
        }
    }
}
