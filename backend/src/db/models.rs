use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{BreedEntry, GeoFix, Predictions, ScanRecord, Sighting};
use std::collections::HashMap;
use uuid::Uuid;

/// A scan that has been classified and uploaded but not yet stored.
#[derive(Debug, Clone)]
pub struct NewScan {
    pub image_url: String,
    pub image_key: String,
    pub image_sha256: String,
    pub predictions: Predictions,
    pub location: Option<GeoFix>,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl NewScan {
    pub fn into_record(self, id: Uuid) -> ScanRecord {
        ScanRecord {
            id,
            image_url: self.image_url,
            image_key: self.image_key,
            image_sha256: self.image_sha256,
            predictions: self.predictions,
            location: self.location,
            user_id: self.user_id,
            is_helpful: None,
            reviewed_by: None,
            reviewed_at: None,
            flagged: None,
            flag_reason: None,
            flagged_by: None,
            flagged_at: None,
            created_at: self.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewUpdate {
    pub is_helpful: bool,
    pub reviewed_by: Uuid,
    pub reviewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlagUpdate {
    pub flagged: bool,
    pub reason: Option<String>,
    pub flagged_by: Uuid,
    pub flagged_at: DateTime<Utc>,
}

impl FlagUpdate {
    /// Clearing a flag always clears its reason; blank reasons are dropped.
    pub fn new(flagged: bool, reason: Option<&str>, flagged_by: Uuid, flagged_at: DateTime<Utc>) -> Self {
        let reason = if flagged {
            reason
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
        } else {
            None
        };
        Self {
            flagged,
            reason,
            flagged_by,
            flagged_at,
        }
    }
}

/// Conjunction of DynamoDB filter clauses with placeholder names and values.
#[derive(Debug, Default, Clone)]
pub struct FilterExpression {
    clauses: Vec<String>,
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

impl FilterExpression {
    pub fn new() -> Self {
        Self::default()
    }

    fn placeholders(&mut self, attribute: &str, value: AttributeValue) -> (String, String) {
        let name = format!("#{}", attribute);
        let value_key = format!(":v{}", self.values.len());
        self.names.insert(name.clone(), attribute.to_string());
        self.values.insert(value_key.clone(), value);
        (name, value_key)
    }

    pub fn compare(mut self, attribute: &str, operator: &str, value: AttributeValue) -> Self {
        let (name, value_key) = self.placeholders(attribute, value);
        self.clauses.push(format!("{} {} {}", name, operator, value_key));
        self
    }

    pub fn equals(self, attribute: &str, value: AttributeValue) -> Self {
        self.compare(attribute, "=", value)
    }

    pub fn expression(&self) -> Option<String> {
        if self.clauses.is_empty() {
            None
        } else {
            Some(self.clauses.join(" AND "))
        }
    }

    pub fn names(&self) -> &HashMap<String, String> {
        &self.names
    }

    pub fn values(&self) -> &HashMap<String, AttributeValue> {
        &self.values
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Query parameters of the breed catalog listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BreedFilter {
    pub species: Option<String>,
    pub origin: Option<String>,
    pub status: Option<String>,
    /// Case-insensitive substring of the breed name.
    pub q: Option<String>,
}

/// Breed rows are reference data, so the whole table is read and every
/// criterion is applied here, ignoring case. DynamoDB comparisons would not.
impl BreedFilter {
    pub fn matches(&self, breed: &BreedEntry) -> bool {
        let ci_eq = |wanted: Option<&str>, actual: &str| {
            wanted.is_none_or(|w| actual.eq_ignore_ascii_case(w))
        };
        let ci_contains = |wanted: Option<&str>, actual: &str| {
            wanted.is_none_or(|w| actual.to_lowercase().contains(&w.to_lowercase()))
        };
        ci_eq(non_blank(&self.species), &breed.species)
            && ci_contains(non_blank(&self.origin), &breed.origin)
            && ci_eq(non_blank(&self.status), &breed.status)
            && ci_contains(non_blank(&self.q), &breed.name)
    }
}

/// Query parameters of the sightings map: a breed and/or a bounding box.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SightingFilter {
    pub breed: Option<String>,
    pub min_lat: Option<f64>,
    pub max_lat: Option<f64>,
    pub min_lng: Option<f64>,
    pub max_lng: Option<f64>,
}

impl SightingFilter {
    pub fn to_expression(&self) -> FilterExpression {
        let number = |v: f64| AttributeValue::N(v.to_string());
        let mut filter = FilterExpression::new();
        if let Some(breed) = non_blank(&self.breed) {
            filter = filter.equals("breed_id", AttributeValue::S(breed.to_string()));
        }
        if let Some(v) = self.min_lat {
            filter = filter.compare("latitude", ">=", number(v));
        }
        if let Some(v) = self.max_lat {
            filter = filter.compare("latitude", "<=", number(v));
        }
        if let Some(v) = self.min_lng {
            filter = filter.compare("longitude", ">=", number(v));
        }
        if let Some(v) = self.max_lng {
            filter = filter.compare("longitude", "<=", number(v));
        }
        filter
    }

    pub fn matches(&self, sighting: &Sighting) -> bool {
        let c = sighting.coordinates;
        non_blank(&self.breed).is_none_or(|b| sighting.breed_id == b)
            && self.min_lat.is_none_or(|v| c.latitude >= v)
            && self.max_lat.is_none_or(|v| c.latitude <= v)
            && self.min_lng.is_none_or(|v| c.longitude >= v)
            && self.max_lng.is_none_or(|v| c.longitude <= v)
    }
}
