use async_trait::async_trait;
use reqwest::Client;
use shared::{Coordinates, GeoFix, LocationSource};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use url::Url;

use super::{GeoError, PositionOptions, PositionSource};

/// ipinfo-style lookup: `GET <base>/<ip>/loc?token=…` answers `"lat,lng"`.
#[derive(Clone)]
pub struct IpLookupClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl IpLookupClient {
    /// City-level at best; reported as a fixed radius.
    pub const ACCURACY_M: f64 = 50_000.0;
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, GeoError> {
        let client = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GeoError::Lookup(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            token,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    pub fn lookup_url(&self, ip: IpAddr) -> Result<Url, GeoError> {
        let token = self.token.as_deref().ok_or(GeoError::NotConfigured)?;
        let raw = format!("{}/{}/loc", self.base_url.trim_end_matches('/'), ip);
        Url::parse_with_params(&raw, &[("token", token)])
            .map_err(|e| GeoError::Lookup(format!("bad lookup URL: {}", e)))
    }

    pub async fn locate(&self, ip: IpAddr) -> Result<GeoFix, GeoError> {
        let url = self.lookup_url(ip)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| GeoError::Lookup(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeoError::Lookup(format!("HTTP {}", status.as_u16())));
        }
        let body = response
            .text()
            .await
            .map_err(|e| GeoError::Lookup(e.to_string()))?;

        let coordinates = parse_loc(&body)?;
        log::debug!("IP {} located near {:?}", ip, coordinates);
        Ok(GeoFix {
            coordinates,
            accuracy_m: Self::ACCURACY_M,
            source: LocationSource::IpLookup,
        })
    }

    pub fn locator(&self, ip: Option<IpAddr>) -> IpLocator {
        IpLocator {
            client: self.clone(),
            ip,
        }
    }
}

/// Parses `"lat,lng"` as returned by the lookup service.
pub fn parse_loc(body: &str) -> Result<Coordinates, GeoError> {
    let invalid = || GeoError::InvalidResponse(body.trim().to_string());
    let (lat, lng) = body.trim().split_once(',').ok_or_else(invalid)?;
    let latitude: f64 = lat.trim().parse().map_err(|_| invalid())?;
    let longitude: f64 = lng.trim().parse().map_err(|_| invalid())?;
    let coordinates = Coordinates::new(latitude, longitude);
    if !coordinates.is_valid() {
        return Err(invalid());
    }
    Ok(coordinates)
}

/// Accepts a bare address or `addr:port` as reported by the connection info.
pub fn parse_client_ip(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim();
    raw.parse::<IpAddr>()
        .ok()
        .or_else(|| raw.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}

/// Whether an address can be meaningfully geolocated.
pub fn is_public_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation())
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            !(v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80)
        }
    }
}

/// The lookup bound to one client address.
pub struct IpLocator {
    client: IpLookupClient,
    ip: Option<IpAddr>,
}

#[async_trait]
impl PositionSource for IpLocator {
    async fn current_position(&self, _options: &PositionOptions) -> Result<GeoFix, GeoError> {
        match self.ip {
            Some(ip) if is_public_ip(&ip) => self.client.locate(ip).await,
            Some(ip) => Err(GeoError::Lookup(format!("{} is not a public address", ip))),
            None => Err(GeoError::Unsupported),
        }
    }
}
