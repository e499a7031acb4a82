use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use shared::{BreedEntry, Coordinates, GeoFix, LocationSource, Predictions, ScanRecord, Sighting};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use super::models::{BreedFilter, FilterExpression, FlagUpdate, NewScan, ReviewUpdate, SightingFilter};
use super::ScanStore;

type Item = HashMap<String, AttributeValue>;

#[derive(Clone)]
pub struct DynamoDbRepository {
    client: Client,
    scans_table: String,
    breeds_table: String,
    sightings_table: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("DynamoDB error: {0}")]
    DynamoDb(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Item not found")]
    NotFound,
    #[error("Invalid data format: {0}")]
    InvalidData(String),
}

impl DynamoDbRepository {
    pub fn new(
        client: Client,
        scans_table: String,
        breeds_table: String,
        sightings_table: String,
    ) -> Self {
        Self {
            client,
            scans_table,
            breeds_table,
            sightings_table,
        }
    }

    pub async fn get_scan(&self, id: Uuid) -> Result<Option<ScanRecord>, RepositoryError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.scans_table)
            .key("id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;

        match result.item {
            Some(item) => Ok(Some(Self::parse_scan_from_item(item)?)),
            None => Ok(None),
        }
    }

    pub async fn list_breeds(&self, filter: &BreedFilter) -> Result<Vec<BreedEntry>, RepositoryError> {
        let items = self
            .scan_table(&self.breeds_table, &FilterExpression::new())
            .await?;
        Self::select_breeds(items, filter)
    }

    /// Parses catalog rows, keeps those matching `filter` and sorts by name.
    pub fn select_breeds(items: Vec<Item>, filter: &BreedFilter) -> Result<Vec<BreedEntry>, RepositoryError> {
        let mut breeds = Vec::with_capacity(items.len());
        for item in items {
            let breed = Self::parse_breed_from_item(item)?;
            if filter.matches(&breed) {
                breeds.push(breed);
            }
        }
        breeds.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(breeds)
    }

    pub async fn list_sightings(
        &self,
        filter: &SightingFilter,
    ) -> Result<Vec<Sighting>, RepositoryError> {
        let items = self
            .scan_table(&self.sightings_table, &filter.to_expression())
            .await?;

        let mut sightings = items
            .into_iter()
            .map(Self::parse_sighting_from_item)
            .filter(|parsed| parsed.as_ref().map_or(true, |s| filter.matches(s)))
            .collect::<Result<Vec<_>, _>>()?;
        sightings.sort_by(|a, b| b.confirmed_at.cmp(&a.confirmed_at));
        Ok(sightings)
    }

    /// Full table scan, following `LastEvaluatedKey` until the table is exhausted.
    async fn scan_table(
        &self,
        table: &str,
        filter: &FilterExpression,
    ) -> Result<Vec<Item>, RepositoryError> {
        let mut items = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let mut request = self
                .client
                .scan()
                .table_name(table)
                .set_exclusive_start_key(start_key.take());

            if let Some(expression) = filter.expression() {
                request = request
                    .filter_expression(expression)
                    .set_expression_attribute_names(Some(filter.names().clone()))
                    .set_expression_attribute_values(Some(filter.values().clone()));
            }

            let page = request.send().await.map_err(|e| {
                log::error!("DynamoDB scan of '{}' failed: {:?}", table, e);
                RepositoryError::DynamoDb(e.to_string())
            })?;

            items.extend(page.items.unwrap_or_default());
            match page.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        log::debug!("Scanned {} items from '{}'", items.len(), table);
        Ok(items)
    }

    async fn update_scan(
        &self,
        id: Uuid,
        update_expression: String,
        values: Item,
    ) -> Result<(), RepositoryError> {
        log::debug!("Update expression for scan {}: {}", id, update_expression);

        self.client
            .update_item()
            .table_name(&self.scans_table)
            .key("id", AttributeValue::S(id.to_string()))
            .update_expression(update_expression)
            .condition_expression("attribute_exists(id)")
            .set_expression_attribute_values(Some(values))
            .send()
            .await
            .map_err(|e| {
                if e
                    .as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception())
                {
                    log::warn!("Scan {} does not exist", id);
                    RepositoryError::NotFound
                } else {
                    log::error!("DynamoDB update_item failed for scan {}: {:?}", id, e);
                    RepositoryError::DynamoDb(e.to_string())
                }
            })?;

        Ok(())
    }

    pub fn review_update_expression(update: &ReviewUpdate) -> (String, Item) {
        let mut values = HashMap::new();
        values.insert(":is_helpful".to_string(), AttributeValue::Bool(update.is_helpful));
        values.insert(
            ":reviewed_by".to_string(),
            AttributeValue::S(update.reviewed_by.to_string()),
        );
        values.insert(
            ":reviewed_at".to_string(),
            AttributeValue::S(update.reviewed_at.to_rfc3339()),
        );
        (
            "SET is_helpful = :is_helpful, reviewed_by = :reviewed_by, reviewed_at = :reviewed_at"
                .to_string(),
            values,
        )
    }

    /// Without a reason the stored `flag_reason` is removed rather than left stale.
    pub fn flag_update_expression(update: &FlagUpdate) -> (String, Item) {
        let mut set_parts = vec![
            "flagged = :flagged",
            "flagged_by = :flagged_by",
            "flagged_at = :flagged_at",
        ];
        let mut values = HashMap::new();
        values.insert(":flagged".to_string(), AttributeValue::Bool(update.flagged));
        values.insert(
            ":flagged_by".to_string(),
            AttributeValue::S(update.flagged_by.to_string()),
        );
        values.insert(
            ":flagged_at".to_string(),
            AttributeValue::S(update.flagged_at.to_rfc3339()),
        );

        let expression = match &update.reason {
            Some(reason) => {
                set_parts.push("flag_reason = :flag_reason");
                values.insert(":flag_reason".to_string(), AttributeValue::S(reason.clone()));
                format!("SET {}", set_parts.join(", "))
            }
            None => format!("SET {} REMOVE flag_reason", set_parts.join(", ")),
        };
        (expression, values)
    }

    pub fn scan_to_item(record: &ScanRecord) -> Result<Item, RepositoryError> {
        let mut item = HashMap::new();
        item.insert("id".to_string(), AttributeValue::S(record.id.to_string()));
        item.insert(
            "image_url".to_string(),
            AttributeValue::S(record.image_url.clone()),
        );
        item.insert(
            "image_key".to_string(),
            AttributeValue::S(record.image_key.clone()),
        );
        item.insert(
            "image_sha256".to_string(),
            AttributeValue::S(record.image_sha256.clone()),
        );
        item.insert(
            "predictions".to_string(),
            AttributeValue::S(serde_json::to_string(&record.predictions)?),
        );
        if let Some(top) = record.predictions.top() {
            item.insert("top_breed".to_string(), AttributeValue::S(top.breed));
            item.insert("top_score".to_string(), AttributeValue::N(top.score.to_string()));
        }
        if let Some(fix) = &record.location {
            item.insert(
                "latitude".to_string(),
                AttributeValue::N(fix.coordinates.latitude.to_string()),
            );
            item.insert(
                "longitude".to_string(),
                AttributeValue::N(fix.coordinates.longitude.to_string()),
            );
            item.insert(
                "location_accuracy_m".to_string(),
                AttributeValue::N(fix.accuracy_m.to_string()),
            );
            item.insert(
                "location_source".to_string(),
                AttributeValue::S(fix.source.to_string()),
            );
        }
        if let Some(user_id) = record.user_id {
            item.insert("user_id".to_string(), AttributeValue::S(user_id.to_string()));
        }
        item.insert(
            "created_at".to_string(),
            AttributeValue::S(record.created_at.clone()),
        );
        Ok(item)
    }

    pub fn parse_scan_from_item(item: Item) -> Result<ScanRecord, RepositoryError> {
        let id = item
            .get("id")
            .and_then(|v| v.as_s().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| RepositoryError::InvalidData("Invalid scan id".to_string()))?;

        let predictions: Predictions = serde_json::from_str(&require_s(&item, "predictions")?)?;

        let location = match (number::<f64>(&item, "latitude"), number::<f64>(&item, "longitude")) {
            (Some(latitude), Some(longitude)) => Some(GeoFix {
                coordinates: Coordinates::new(latitude, longitude),
                accuracy_m: number(&item, "location_accuracy_m").unwrap_or_default(),
                source: string(&item, "location_source")
                    .and_then(|s| LocationSource::from_str(&s).ok())
                    .unwrap_or(LocationSource::Device),
            }),
            _ => None,
        };

        Ok(ScanRecord {
            id,
            image_url: require_s(&item, "image_url")?,
            image_key: string(&item, "image_key").unwrap_or_default(),
            image_sha256: string(&item, "image_sha256").unwrap_or_default(),
            predictions,
            location,
            user_id: uuid(&item, "user_id"),
            is_helpful: boolean(&item, "is_helpful"),
            reviewed_by: uuid(&item, "reviewed_by"),
            reviewed_at: string(&item, "reviewed_at"),
            flagged: boolean(&item, "flagged"),
            flag_reason: string(&item, "flag_reason"),
            flagged_by: uuid(&item, "flagged_by"),
            flagged_at: string(&item, "flagged_at"),
            created_at: require_s(&item, "created_at")?,
        })
    }

    pub fn parse_breed_from_item(item: Item) -> Result<BreedEntry, RepositoryError> {
        let characteristics = match item.get("characteristics") {
            Some(AttributeValue::L(list)) => list
                .iter()
                .filter_map(|v| v.as_s().ok().cloned())
                .collect(),
            Some(AttributeValue::Ss(set)) => set.clone(),
            Some(AttributeValue::S(text)) => text
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            _ => Vec::new(),
        };

        Ok(BreedEntry {
            id: require_s(&item, "id")?,
            name: require_s(&item, "name")?,
            species: string(&item, "species").unwrap_or_default(),
            origin: string(&item, "origin").unwrap_or_default(),
            status: string(&item, "status").unwrap_or_default(),
            characteristics,
        })
    }

    pub fn parse_sighting_from_item(item: Item) -> Result<Sighting, RepositoryError> {
        let latitude = number(&item, "latitude")
            .ok_or_else(|| RepositoryError::InvalidData("Invalid latitude".to_string()))?;
        let longitude = number(&item, "longitude")
            .ok_or_else(|| RepositoryError::InvalidData("Invalid longitude".to_string()))?;
        let breed_id = require_s(&item, "breed_id")?;

        Ok(Sighting {
            id: require_s(&item, "id")?,
            breed_name: string(&item, "breed_name").unwrap_or_else(|| breed_id.clone()),
            breed_id,
            coordinates: Coordinates::new(latitude, longitude),
            image_url: string(&item, "image_url").unwrap_or_default(),
            confirmed_at: require_s(&item, "confirmed_at")?,
            scan_id: string(&item, "scan_id"),
        })
    }
}

fn string(item: &Item, key: &str) -> Option<String> {
    item.get(key).and_then(|v| v.as_s().ok()).cloned()
}

fn require_s(item: &Item, key: &str) -> Result<String, RepositoryError> {
    string(item, key).ok_or_else(|| RepositoryError::InvalidData(format!("Invalid {}", key)))
}

fn number<T: FromStr>(item: &Item, key: &str) -> Option<T> {
    item.get(key)
        .and_then(|v| v.as_n().ok())
        .and_then(|s| s.parse::<T>().ok())
}

fn boolean(item: &Item, key: &str) -> Option<bool> {
    item.get(key).and_then(|v| v.as_bool().ok()).copied()
}

fn uuid(item: &Item, key: &str) -> Option<Uuid> {
    item.get(key)
        .and_then(|v| v.as_s().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
}

#[async_trait]
impl ScanStore for DynamoDbRepository {
    async fn insert_scan(&self, scan: &NewScan) -> Result<Uuid, RepositoryError> {
        let id = Uuid::new_v4();
        let record = scan.clone().into_record(id);
        let item = Self::scan_to_item(&record)?;

        self.client
            .put_item()
            .table_name(&self.scans_table)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(id)")
            .send()
            .await
            .map_err(|e| {
                log::error!("DynamoDB put_item failed for scan {}: {:?}", id, e);
                RepositoryError::DynamoDb(e.to_string())
            })?;

        log::info!("Stored scan {} in '{}'", id, self.scans_table);
        Ok(id)
    }

    async fn update_review(&self, id: Uuid, update: &ReviewUpdate) -> Result<(), RepositoryError> {
        let (expression, values) = Self::review_update_expression(update);
        self.update_scan(id, expression, values).await
    }

    async fn update_flag(&self, id: Uuid, update: &FlagUpdate) -> Result<(), RepositoryError> {
        let (expression, values) = Self::flag_update_expression(update);
        self.update_scan(id, expression, values).await
    }
}
