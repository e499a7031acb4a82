mod catalog;
mod geo;
mod predictions;
mod scan;

pub use catalog::{BreedEntry, Sighting};
pub use geo::{Coordinates, GeoFix, LocationSource};
pub use predictions::{Predictions, RankedPrediction};
pub use scan::{
    FlagRequest, ReviewRequest, ScanEvent, ScanPhase, ScanRecord, ScanResponse, ScanStep,
    ScanSummary,
};
