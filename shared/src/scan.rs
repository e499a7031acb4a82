use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

use crate::geo::GeoFix;
use crate::predictions::{Predictions, RankedPrediction};

/// Body returned by the classification endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResponse {
    pub data: Option<Predictions>,
    pub error: Option<String>,
}

impl ScanResponse {
    pub fn success(predictions: Predictions) -> Self {
        Self {
            data: Some(predictions),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(message.into()),
        }
    }

    /// A non-null `error` wins over any `data` that came with it.
    pub fn into_result(self) -> Result<Predictions, String> {
        match (self.data, self.error) {
            (_, Some(error)) => Err(error),
            (Some(data), None) => Ok(data),
            (None, None) => Err("response carried neither data nor error".to_string()),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScanPhase {
    #[default]
    Idle,
    Classifying,
    Uploading,
    Persisting,
    Done,
    Failed,
}

impl ScanPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanPhase::Done | ScanPhase::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScanStep {
    Classify,
    Upload,
    Persist,
}

impl ScanStep {
    /// Phase the orchestrator sits in while this step runs.
    pub fn phase(&self) -> ScanPhase {
        match self {
            ScanStep::Classify => ScanPhase::Classifying,
            ScanStep::Upload => ScanPhase::Uploading,
            ScanStep::Persist => ScanPhase::Persisting,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    PhaseChanged { from: ScanPhase, to: ScanPhase },
    StepStarted { step: ScanStep },
    StepFinished { step: ScanStep },
    StepFailed { step: ScanStep, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: Uuid,
    pub image_url: String,
    pub image_key: String,
    pub image_sha256: String,
    pub predictions: Predictions,
    #[serde(default)]
    pub location: Option<GeoFix>,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub is_helpful: Option<bool>,
    #[serde(default)]
    pub reviewed_by: Option<Uuid>,
    #[serde(default)]
    pub reviewed_at: Option<String>,
    #[serde(default)]
    pub flagged: Option<bool>,
    #[serde(default)]
    pub flag_reason: Option<String>,
    #[serde(default)]
    pub flagged_by: Option<Uuid>,
    #[serde(default)]
    pub flagged_at: Option<String>,
    pub created_at: String,
}

impl ScanRecord {
    pub fn top_prediction(&self) -> Option<RankedPrediction> {
        self.predictions.top()
    }
}

/// Returned by the scan pipeline endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSummary {
    pub record: ScanRecord,
    pub top_prediction: Option<RankedPrediction>,
    pub events: Vec<ScanEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub is_helpful: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagRequest {
    pub flag: bool,
    #[serde(default)]
    pub reason: Option<String>,
}
