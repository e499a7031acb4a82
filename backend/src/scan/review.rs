use chrono::Utc;
use uuid::Uuid;

use super::ScanError;
use crate::auth::models::Identity;
use crate::db::{FlagUpdate, RepositoryError, ReviewUpdate, ScanStore};

/// Helpful/not-helpful reviews and inspection flags on stored scans.
///
/// Both actions overwrite the previous value, so repeating one is harmless.
#[derive(Clone)]
pub struct ReviewService<D> {
    scans: D,
}

impl<D: ScanStore> ReviewService<D> {
    pub fn new(scans: D) -> Self {
        Self { scans }
    }

    pub async fn set_helpful(
        &self,
        record_id: Uuid,
        is_helpful: bool,
        identity: Option<&Identity>,
    ) -> Result<ReviewUpdate, ScanError> {
        let identity = identity.ok_or(ScanError::AuthRequired)?;
        let update = ReviewUpdate {
            is_helpful,
            reviewed_by: identity.user_id,
            reviewed_at: Utc::now(),
        };

        self.scans
            .update_review(record_id, &update)
            .await
            .map_err(|e| write_error(record_id, e))?;

        log::info!(
            "Scan {} marked {} by {}",
            record_id,
            if is_helpful { "helpful" } else { "not helpful" },
            identity.user_id
        );
        Ok(update)
    }

    pub async fn set_flag(
        &self,
        record_id: Uuid,
        flag: bool,
        reason: Option<&str>,
        identity: Option<&Identity>,
    ) -> Result<FlagUpdate, ScanError> {
        let identity = identity.ok_or(ScanError::AuthRequired)?;
        let update = FlagUpdate::new(flag, reason, identity.user_id, Utc::now());

        self.scans
            .update_flag(record_id, &update)
            .await
            .map_err(|e| write_error(record_id, e))?;

        log::info!(
            "Scan {} {} for inspection by {}",
            record_id,
            if flag { "flagged" } else { "unflagged" },
            identity.user_id
        );
        Ok(update)
    }
}

fn write_error(record_id: Uuid, err: RepositoryError) -> ScanError {
    match err {
        RepositoryError::NotFound => ScanError::NotFound(record_id),
        other => ScanError::Persist(other.to_string()),
    }
}
