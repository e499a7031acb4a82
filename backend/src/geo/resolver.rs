use async_trait::async_trait;
use shared::{GeoFix, LocationSource};

use super::{GeoError, PositionOptions, PositionSource};
use crate::scan::ScanError;

/// Device position first, coarse fallback second.
pub struct GeolocationResolver<P, F> {
    primary: P,
    fallback: F,
    options: PositionOptions,
}

impl<P: PositionSource, F: PositionSource> GeolocationResolver<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self::with_options(primary, fallback, PositionOptions::default())
    }

    pub fn with_options(primary: P, fallback: F, options: PositionOptions) -> Self {
        Self {
            primary,
            fallback,
            options,
        }
    }

    /// Fails only when both sources fail.
    pub async fn resolve(&self) -> Result<GeoFix, ScanError> {
        let primary = tokio::time::timeout(
            self.options.timeout,
            self.primary.current_position(&self.options),
        )
        .await;

        let primary_err = match primary {
            Ok(Ok(fix)) => return Ok(fix),
            Ok(Err(err)) => err,
            Err(_) => GeoError::Timeout(self.options.timeout),
        };
        log::debug!("Device position unavailable ({}), trying IP lookup", primary_err);

        match self.fallback.current_position(&self.options).await {
            Ok(fix) => Ok(fix),
            Err(fallback_err) => {
                log::warn!(
                    "Location unavailable: device {}, IP lookup {}",
                    primary_err,
                    fallback_err
                );
                Err(ScanError::LocationUnavailable(format!(
                    "device: {}; ip lookup: {}",
                    primary_err, fallback_err
                )))
            }
        }
    }
}

/// Position the client measured on the device and sent along with the scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportedPosition(pub Option<GeoFix>);

impl ReportedPosition {
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>, accuracy_m: Option<f64>) -> Self {
        let fix = match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoFix {
                coordinates: shared::Coordinates::new(latitude, longitude),
                accuracy_m: accuracy_m.filter(|a| a.is_finite() && *a >= 0.0).unwrap_or(0.0),
                source: LocationSource::Device,
            }),
            _ => None,
        };
        Self(fix)
    }
}

#[async_trait]
impl PositionSource for ReportedPosition {
    async fn current_position(&self, _options: &PositionOptions) -> Result<GeoFix, GeoError> {
        match self.0 {
            Some(fix) if fix.coordinates.is_valid() => Ok(fix),
            Some(fix) => Err(GeoError::InvalidResponse(format!(
                "{},{} is out of range",
                fix.coordinates.latitude, fix.coordinates.longitude
            ))),
            None => Err(GeoError::Unsupported),
        }
    }
}
