use shared::Predictions;
use std::sync::Arc;

use super::config::ClassifierConfig;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Image payload is empty")]
    EmptyImage,
    #[error("Model produced no predictions")]
    NoPredictions,
}

/// Placeholder model: waits the configured latency and returns a canned distribution.
#[derive(Clone)]
pub struct Model {
    config: Arc<ClassifierConfig>,
}

impl Model {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub async fn inference(&self, image: &[u8]) -> Result<Predictions, InferenceError> {
        if image.is_empty() {
            return Err(InferenceError::EmptyImage);
        }
        tokio::time::sleep(self.config.latency()).await;

        if self.config.predictions.is_empty() {
            return Err(InferenceError::NoPredictions);
        }
        log::debug!("Stub inference over {} bytes", image.len());
        Ok(self.config.predictions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn waits_then_answers() {
        let model = Model::new(ClassifierConfig::default());
        let started = tokio::time::Instant::now();
        let predictions = model.inference(b"jpeg").await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert_eq!(predictions.top().unwrap().breed, "Gir");
    }

    #[tokio::test]
    async fn empty_image_fails_fast() {
        let model = Model::new(ClassifierConfig::default());
        assert!(matches!(
            model.inference(&[]).await,
            Err(InferenceError::EmptyImage)
        ));
    }
}
