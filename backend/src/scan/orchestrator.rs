use chrono::{DateTime, Utc};
use shared::{Predictions, ScanEvent, ScanPhase, ScanRecord, ScanStep};
use uuid::Uuid;

use super::events::ScanObserver;
use super::{ScanContext, ScanError, ScanImage};
use crate::classify::Classifier;
use crate::db::{NewScan, ScanStore};
use crate::storage::{AssetStore, S3Service};

/// Everything a run has produced so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanState {
    pub phase: ScanPhase,
    pub predictions: Option<Predictions>,
    pub image_url: Option<String>,
    pub record_id: Option<Uuid>,
    pub failure: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadedAsset {
    pub key: String,
    pub url: String,
    pub sha256: String,
}

/// Runs classify → upload → persist, one step at a time.
///
/// A step only starts once the previous one succeeded, so a failure anywhere
/// leaves nothing in the scans table.
pub struct ScanOrchestrator<C, S, D> {
    classifier: C,
    assets: S,
    scans: D,
    state: ScanState,
    observers: Vec<Box<dyn ScanObserver>>,
}

impl<C, S, D> ScanOrchestrator<C, S, D>
where
    C: Classifier,
    S: AssetStore,
    D: ScanStore,
{
    pub fn new(classifier: C, assets: S, scans: D) -> Self {
        Self {
            classifier,
            assets,
            scans,
            state: ScanState::default(),
            observers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, observer: impl ScanObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    pub fn phase(&self) -> ScanPhase {
        self.state.phase
    }

    /// Drops all results of the current or previous run. Requests already sent
    /// are not aborted; their results are simply never recorded.
    pub fn reset(&mut self) {
        let from = self.state.phase;
        self.state = ScanState::default();
        if from != ScanPhase::Idle {
            self.notify(ScanEvent::PhaseChanged {
                from,
                to: ScanPhase::Idle,
            });
        }
    }

    pub async fn run(
        &mut self,
        image: &ScanImage,
        context: ScanContext,
    ) -> Result<ScanRecord, ScanError> {
        self.reset();

        self.begin(ScanStep::Classify);
        let outcome = classify(&self.classifier, image).await;
        let predictions = self.settle(ScanStep::Classify, outcome)?;
        self.state.predictions = Some(predictions.clone());

        self.begin(ScanStep::Upload);
        let outcome = upload(&self.assets, image, Utc::now()).await;
        let asset = self.settle(ScanStep::Upload, outcome)?;
        self.state.image_url = Some(asset.url.clone());

        self.begin(ScanStep::Persist);
        let scan = build_scan(asset, predictions, context, Utc::now());
        let outcome = persist(&self.scans, scan).await;
        let record = self.settle(ScanStep::Persist, outcome)?;
        self.state.record_id = Some(record.id);

        self.enter(ScanPhase::Done);
        Ok(record)
    }

    fn notify(&self, event: ScanEvent) {
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }

    fn enter(&mut self, to: ScanPhase) {
        let from = self.state.phase;
        self.state.phase = to;
        self.notify(ScanEvent::PhaseChanged { from, to });
    }

    fn begin(&mut self, step: ScanStep) {
        self.enter(step.phase());
        self.notify(ScanEvent::StepStarted { step });
    }

    fn settle<T>(&mut self, step: ScanStep, outcome: Result<T, ScanError>) -> Result<T, ScanError> {
        match outcome {
            Ok(value) => {
                self.notify(ScanEvent::StepFinished { step });
                Ok(value)
            }
            Err(err) => {
                let message = err.to_string();
                self.notify(ScanEvent::StepFailed {
                    step,
                    message: message.clone(),
                });
                self.state.failure = Some(message);
                self.enter(ScanPhase::Failed);
                Err(err)
            }
        }
    }
}

pub async fn classify<C: Classifier + ?Sized>(
    classifier: &C,
    image: &ScanImage,
) -> Result<Predictions, ScanError> {
    let predictions = classifier
        .classify(image)
        .await
        .map_err(|e| ScanError::Classification(e.to_string()))?;

    if predictions.is_empty() {
        return Err(ScanError::Classification(
            "classifier returned no predictions".to_string(),
        ));
    }
    if !predictions.has_valid_scores() {
        return Err(ScanError::Classification(format!(
            "scores must lie between 0 and {}",
            Predictions::MAX_SCORE
        )));
    }
    Ok(predictions)
}

pub async fn upload<S: AssetStore + ?Sized>(
    store: &S,
    image: &ScanImage,
    uploaded_at: DateTime<Utc>,
) -> Result<UploadedAsset, ScanError> {
    let key = S3Service::generate_object_key(uploaded_at, &image.file_name);

    store
        .put_object(&key, &image.bytes, &image.mime_type)
        .await
        .map_err(|e| ScanError::Upload(e.to_string()))?;

    let url = store
        .public_url(&key)
        .ok_or_else(|| ScanError::Upload(format!("no public URL for {}", key)))?;

    Ok(UploadedAsset {
        key,
        url,
        sha256: S3Service::calculate_image_hash(&image.bytes),
    })
}

pub fn build_scan(
    asset: UploadedAsset,
    predictions: Predictions,
    context: ScanContext,
    created_at: DateTime<Utc>,
) -> NewScan {
    NewScan {
        image_url: asset.url,
        image_key: asset.key,
        image_sha256: asset.sha256,
        predictions,
        location: context.location,
        user_id: context.identity.map(|identity| identity.user_id),
        created_at,
    }
}

pub async fn persist<D: ScanStore + ?Sized>(
    store: &D,
    scan: NewScan,
) -> Result<ScanRecord, ScanError> {
    if scan.image_url.is_empty() || scan.predictions.is_empty() {
        return Err(ScanError::Persist(
            "a scan needs an image URL and at least one prediction".to_string(),
        ));
    }

    let id = store
        .insert_scan(&scan)
        .await
        .map_err(|e| ScanError::Persist(e.to_string()))?;
    Ok(scan.into_record(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::Identity;
    use crate::classify::ClassifierError;
    use crate::db::{FlagUpdate, RepositoryError, ReviewUpdate};
    use crate::scan::EventLog;
    use crate::storage::S3ServiceError;
    use async_trait::async_trait;
    use futures::FutureExt;
    use shared::{Coordinates, GeoFix, LocationSource};
    use std::sync::{Arc, Mutex};

    struct FakeClassifier(Result<Predictions, String>);

    #[async_trait]
    impl Classifier for FakeClassifier {
        async fn classify(&self, _image: &ScanImage) -> Result<Predictions, ClassifierError> {
            self.0.clone().map_err(ClassifierError::Rejected)
        }
    }

    struct StalledClassifier;

    #[async_trait]
    impl Classifier for StalledClassifier {
        async fn classify(&self, _image: &ScanImage) -> Result<Predictions, ClassifierError> {
            futures::future::pending().await
        }
    }

    #[derive(Clone, Default)]
    struct FakeAssets {
        fail: bool,
        no_url: bool,
        puts: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl AssetStore for FakeAssets {
        async fn put_object(
            &self,
            key: &str,
            _bytes: &[u8],
            _mime_type: &str,
        ) -> Result<(), S3ServiceError> {
            if self.fail {
                return Err(S3ServiceError::S3("bucket unreachable".into()));
            }
            self.puts.lock().unwrap().push(key.to_string());
            Ok(())
        }

        fn public_url(&self, key: &str) -> Option<String> {
            (!self.no_url).then(|| format!("https://cdn.example.com/{}", key))
        }
    }

    #[derive(Clone, Default)]
    struct FakeScans {
        fail: bool,
        inserts: Arc<Mutex<Vec<NewScan>>>,
    }

    #[async_trait]
    impl ScanStore for FakeScans {
        async fn insert_scan(&self, scan: &NewScan) -> Result<Uuid, RepositoryError> {
            if self.fail {
                return Err(RepositoryError::DynamoDb("throughput exceeded".into()));
            }
            self.inserts.lock().unwrap().push(scan.clone());
            Ok(Uuid::new_v4())
        }

        async fn update_review(&self, _id: Uuid, _update: &ReviewUpdate) -> Result<(), RepositoryError> {
            Ok(())
        }

        async fn update_flag(&self, _id: Uuid, _update: &FlagUpdate) -> Result<(), RepositoryError> {
            Ok(())
        }
    }

    fn gir() -> Predictions {
        [("Gir", 92.0), ("Sahiwal", 5.0), ("Red Sindhi", 3.0)]
            .into_iter()
            .collect()
    }

    fn image() -> ScanImage {
        ScanImage::new(b"\xff\xd8\xff\xe0 cow".to_vec(), "cow.jpg", "image/jpeg")
    }

    #[tokio::test]
    async fn happy_path_persists_record() {
        let assets = FakeAssets::default();
        let scans = FakeScans::default();
        let events = EventLog::new();
        let mut orchestrator =
            ScanOrchestrator::new(FakeClassifier(Ok(gir())), assets.clone(), scans.clone());
        orchestrator.subscribe(events.clone());

        let record = orchestrator.run(&image(), ScanContext::default()).await.unwrap();

        let top = record.top_prediction().unwrap();
        assert_eq!((top.breed.as_str(), top.score), ("Gir", 92.0));
        assert!(record.image_url.starts_with("https://cdn.example.com/scans/"));
        assert!(record.image_url.ends_with("-cow.jpg"));
        assert_eq!(record.image_sha256.len(), 64);
        assert_eq!(orchestrator.phase(), ScanPhase::Done);
        assert_eq!(orchestrator.state().record_id, Some(record.id));
        assert_eq!(assets.puts.lock().unwrap().len(), 1);
        assert_eq!(scans.inserts.lock().unwrap().len(), 1);

        let steps: Vec<ScanEvent> = events
            .snapshot()
            .into_iter()
            .filter(|e| !matches!(e, ScanEvent::PhaseChanged { .. }))
            .collect();
        assert_eq!(
            steps,
            vec![
                ScanEvent::StepStarted { step: ScanStep::Classify },
                ScanEvent::StepFinished { step: ScanStep::Classify },
                ScanEvent::StepStarted { step: ScanStep::Upload },
                ScanEvent::StepFinished { step: ScanStep::Upload },
                ScanEvent::StepStarted { step: ScanStep::Persist },
                ScanEvent::StepFinished { step: ScanStep::Persist },
            ]
        );
        assert_eq!(
            events.snapshot().last(),
            Some(&ScanEvent::PhaseChanged {
                from: ScanPhase::Persisting,
                to: ScanPhase::Done
            })
        );
    }

    #[tokio::test]
    async fn classification_failure_stops_chain() {
        let assets = FakeAssets::default();
        let scans = FakeScans::default();
        let mut orchestrator = ScanOrchestrator::new(
            FakeClassifier(Err("Failed to process image.".into())),
            assets.clone(),
            scans.clone(),
        );

        let err = orchestrator.run(&image(), ScanContext::default()).await.unwrap_err();

        assert!(matches!(err, ScanError::Classification(_)));
        assert_eq!(orchestrator.phase(), ScanPhase::Failed);
        assert!(orchestrator.state().predictions.is_none());
        assert!(assets.puts.lock().unwrap().is_empty());
        assert!(scans.inserts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_mapping_is_a_classification_failure() {
        let assets = FakeAssets::default();
        let scans = FakeScans::default();
        let mut orchestrator = ScanOrchestrator::new(
            FakeClassifier(Ok(Predictions::new())),
            assets.clone(),
            scans.clone(),
        );

        let err = orchestrator.run(&image(), ScanContext::default()).await.unwrap_err();
        assert!(matches!(err, ScanError::Classification(_)));
        assert!(assets.puts.lock().unwrap().is_empty());
        assert!(scans.inserts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn out_of_range_score_is_a_classification_failure() {
        let assets = FakeAssets::default();
        let scans = FakeScans::default();
        let inflated: Predictions = [("Gir", 140.0), ("Sahiwal", 5.0)].into_iter().collect();
        let mut orchestrator =
            ScanOrchestrator::new(FakeClassifier(Ok(inflated)), assets.clone(), scans.clone());

        let err = orchestrator.run(&image(), ScanContext::default()).await.unwrap_err();
        assert!(matches!(err, ScanError::Classification(msg) if msg.contains("between 0 and 100")));
        assert_eq!(orchestrator.phase(), ScanPhase::Failed);
        assert!(assets.puts.lock().unwrap().is_empty());
        assert!(scans.inserts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn upload_failure_writes_no_record() {
        let scans = FakeScans::default();
        let events = EventLog::new();
        let mut orchestrator = ScanOrchestrator::new(
            FakeClassifier(Ok(gir())),
            FakeAssets {
                fail: true,
                ..Default::default()
            },
            scans.clone(),
        );
        orchestrator.subscribe(events.clone());

        let err = orchestrator.run(&image(), ScanContext::default()).await.unwrap_err();

        assert!(matches!(err, ScanError::Upload(_)));
        assert_eq!(orchestrator.phase(), ScanPhase::Failed);
        assert_eq!(orchestrator.state().predictions, Some(gir()));
        assert!(orchestrator.state().image_url.is_none());
        assert!(scans.inserts.lock().unwrap().is_empty());
        assert!(events.snapshot().iter().any(|e| matches!(
            e,
            ScanEvent::StepFailed { step: ScanStep::Upload, .. }
        )));
        assert!(!events.snapshot().iter().any(|e| matches!(
            e,
            ScanEvent::StepStarted { step: ScanStep::Persist }
        )));
    }

    #[tokio::test]
    async fn missing_public_url_is_an_upload_failure() {
        let scans = FakeScans::default();
        let mut orchestrator = ScanOrchestrator::new(
            FakeClassifier(Ok(gir())),
            FakeAssets {
                no_url: true,
                ..Default::default()
            },
            scans.clone(),
        );

        let err = orchestrator.run(&image(), ScanContext::default()).await.unwrap_err();
        assert!(matches!(err, ScanError::Upload(_)));
        assert!(scans.inserts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn persist_failure_is_reported() {
        let mut orchestrator = ScanOrchestrator::new(
            FakeClassifier(Ok(gir())),
            FakeAssets::default(),
            FakeScans {
                fail: true,
                ..Default::default()
            },
        );

        let err = orchestrator.run(&image(), ScanContext::default()).await.unwrap_err();
        assert!(matches!(err, ScanError::Persist(_)));
        assert!(orchestrator.state().image_url.is_some());
        assert!(orchestrator.state().record_id.is_none());
        assert!(orchestrator.state().failure.is_some());
    }

    #[tokio::test]
    async fn context_flows_into_record() {
        let user_id = Uuid::new_v4();
        let fix = GeoFix {
            coordinates: Coordinates::new(21.52, 70.46),
            accuracy_m: 15.0,
            source: LocationSource::Device,
        };
        let scans = FakeScans::default();
        let mut orchestrator =
            ScanOrchestrator::new(FakeClassifier(Ok(gir())), FakeAssets::default(), scans.clone());

        let record = orchestrator
            .run(
                &image(),
                ScanContext {
                    location: Some(fix),
                    identity: Some(Identity::new(user_id)),
                },
            )
            .await
            .unwrap();

        assert_eq!(record.user_id, Some(user_id));
        assert_eq!(record.location, Some(fix));
        assert_eq!(scans.inserts.lock().unwrap()[0].user_id, Some(user_id));
    }

    #[tokio::test]
    async fn reset_after_failure_restores_initial_state() {
        let mut orchestrator = ScanOrchestrator::new(
            FakeClassifier(Ok(gir())),
            FakeAssets {
                fail: true,
                ..Default::default()
            },
            FakeScans::default(),
        );
        let _ = orchestrator.run(&image(), ScanContext::default()).await;
        assert_ne!(orchestrator.state(), &ScanState::default());

        orchestrator.reset();
        assert_eq!(orchestrator.state(), &ScanState::default());
    }

    #[tokio::test]
    async fn reset_after_success_restores_initial_state() {
        let mut orchestrator =
            ScanOrchestrator::new(FakeClassifier(Ok(gir())), FakeAssets::default(), FakeScans::default());
        orchestrator.run(&image(), ScanContext::default()).await.unwrap();

        orchestrator.reset();
        assert_eq!(orchestrator.state(), &ScanState::default());
        assert_eq!(orchestrator.phase(), ScanPhase::Idle);
    }

    #[test]
    fn reset_discards_abandoned_run() {
        let scans = FakeScans::default();
        let mut orchestrator =
            ScanOrchestrator::new(StalledClassifier, FakeAssets::default(), scans.clone());

        let image = image();
        let pending = orchestrator.run(&image, ScanContext::default()).now_or_never();
        assert!(pending.is_none());
        assert_eq!(orchestrator.phase(), ScanPhase::Classifying);

        orchestrator.reset();
        assert_eq!(orchestrator.state(), &ScanState::default());
        assert!(scans.inserts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rerun_starts_from_scratch() {
        let scans = FakeScans::default();
        let mut orchestrator =
            ScanOrchestrator::new(FakeClassifier(Ok(gir())), FakeAssets::default(), scans.clone());
        let first = orchestrator.run(&image(), ScanContext::default()).await.unwrap();
        let second = orchestrator.run(&image(), ScanContext::default()).await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(orchestrator.state().record_id, Some(second.id));
        assert_eq!(scans.inserts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn persist_refuses_incomplete_scan() {
        let scans = FakeScans::default();
        let scan = NewScan {
            image_url: String::new(),
            image_key: "scans/1-cow.jpg".into(),
            image_sha256: String::new(),
            predictions: gir(),
            location: None,
            user_id: None,
            created_at: Utc::now(),
        };
        assert!(matches!(persist(&scans, scan).await, Err(ScanError::Persist(_))));
        assert!(scans.inserts.lock().unwrap().is_empty());
    }
}
