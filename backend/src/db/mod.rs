pub mod dynamodb_repository;
pub mod models;

use async_trait::async_trait;
use uuid::Uuid;

pub use dynamodb_repository::{DynamoDbRepository, RepositoryError};
pub use models::{FlagUpdate, NewScan, ReviewUpdate};

/// Write side of the scans table.
#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Stores a new scan and returns its generated id.
    async fn insert_scan(&self, scan: &NewScan) -> Result<Uuid, RepositoryError>;

    async fn update_review(&self, id: Uuid, update: &ReviewUpdate) -> Result<(), RepositoryError>;

    async fn update_flag(&self, id: Uuid, update: &FlagUpdate) -> Result<(), RepositoryError>;
}
