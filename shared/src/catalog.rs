use serde::{Deserialize, Serialize};

use crate::geo::Coordinates;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreedEntry {
    pub id: String,
    pub name: String,
    pub species: String,
    pub origin: String,
    pub status: String,
    #[serde(default)]
    pub characteristics: Vec<String>,
}

/// A scan whose breed was confirmed by a human reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sighting {
    pub id: String,
    pub breed_id: String,
    pub breed_name: String,
    pub coordinates: Coordinates,
    pub image_url: String,
    pub confirmed_at: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub scan_id: Option<String>,
}
