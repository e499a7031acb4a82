use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use shared::{Predictions, ScanResponse};
use std::time::Duration;
use url::Url;

use super::{Classifier, ClassifierError};
use crate::scan::ScanImage;

/// Client for a classification service exposing `POST /scan`.
#[derive(Clone)]
pub struct HttpClassifier {
    client: Client,
    endpoint: Url,
}

impl HttpClassifier {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(base_url: &str) -> Result<Self, ClassifierError> {
        let client = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClassifierError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: Self::scan_endpoint(base_url)?,
        })
    }

    /// Resolves `<base>/scan`, keeping any path prefix on the base URL.
    pub fn scan_endpoint(base_url: &str) -> Result<Url, ClassifierError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(base.join("scan")?)
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, image: &ScanImage) -> Result<Predictions, ClassifierError> {
        let part = Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(&image.mime_type)
            .map_err(|e| ClassifierError::Transport(e.to_string()))?;
        let form = Form::new().part("image", part);

        log::debug!("Posting {} to {}", image.file_name, self.endpoint);
        let response = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClassifierError::Transport(e.to_string()))?;

        let status = response.status();
        let body = match response.json::<ScanResponse>().await {
            Ok(body) => body,
            Err(e) if status.is_success() => {
                return Err(ClassifierError::InvalidResponse(e.to_string()));
            }
            Err(_) => {
                return Err(ClassifierError::Status {
                    status: status.as_u16(),
                    message: status
                        .canonical_reason()
                        .unwrap_or("unknown status")
                        .to_string(),
                });
            }
        };

        if !status.is_success() {
            return Err(ClassifierError::Status {
                status: status.as_u16(),
                message: body.error.unwrap_or_else(|| status.to_string()),
            });
        }
        body.into_result().map_err(ClassifierError::Rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn image() -> ScanImage {
        ScanImage::new(b"\xff\xd8\xff\xe0fake".to_vec(), "cow.jpg", "image/jpeg")
    }

    #[test]
    fn endpoint_keeps_path_prefix() {
        assert_eq!(
            HttpClassifier::scan_endpoint("http://localhost:8080").unwrap().as_str(),
            "http://localhost:8080/scan"
        );
        assert_eq!(
            HttpClassifier::scan_endpoint("http://ml.internal/v1").unwrap().as_str(),
            "http://ml.internal/v1/scan"
        );
    }

    #[tokio::test]
    async fn parses_successful_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/scan"))
            .and(body_string_contains("name=\"image\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"Gir": 92, "Sahiwal": 5, "Red Sindhi": 3},
                "error": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let classifier = HttpClassifier::new(&server.uri()).unwrap();
        let predictions = classifier.classify(&image()).await.unwrap();
        let top = predictions.top().unwrap();
        assert_eq!((top.breed.as_str(), top.score), ("Gir", 92.0));
    }

    #[tokio::test]
    async fn error_field_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/scan"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "data": null,
                "error": "No image file provided."
            })))
            .mount(&server)
            .await;

        let classifier = HttpClassifier::new(&server.uri()).unwrap();
        match classifier.classify(&image()).await {
            Err(ClassifierError::Status { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "No image file provided.");
            }
            other => panic!("unexpected result: {:?}", other.map(|p| p.len())),
        }
    }

    #[tokio::test]
    async fn error_on_ok_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": null,
                "error": "model offline"
            })))
            .mount(&server)
            .await;

        let classifier = HttpClassifier::new(&server.uri()).unwrap();
        assert!(matches!(
            classifier.classify(&image()).await,
            Err(ClassifierError::Rejected(msg)) if msg == "model offline"
        ));
    }

    #[tokio::test]
    async fn non_json_server_error_keeps_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let classifier = HttpClassifier::new(&server.uri()).unwrap();
        assert!(matches!(
            classifier.classify(&image()).await,
            Err(ClassifierError::Status { status: 502, .. })
        ));
    }
}
