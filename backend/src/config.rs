use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Process configuration, read from the environment after `.env` is loaded.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub aws_region: Option<String>,
    pub s3_bucket: String,
    pub public_asset_base_url: Option<String>,
    pub scans_table: String,
    pub breeds_table: String,
    pub sightings_table: String,
    pub jwt_secret: String,
    pub classifier_url: Option<String>,
    pub classifier_config: Option<PathBuf>,
    pub ipinfo_base_url: String,
    pub ipinfo_token: Option<String>,
    pub device_location_timeout: Duration,
}

impl AppConfig {
    pub const DEFAULT_PORT: u16 = 8081;
    pub const DEFAULT_IPINFO_BASE_URL: &'static str = "https://ipinfo.io";
    pub const DEFAULT_DEVICE_TIMEOUT_SECS: u64 = 10;

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let port = match get("PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                key: "PORT",
                value: raw,
            })?,
            None => Self::DEFAULT_PORT,
        };

        let device_location_timeout = match get("DEVICE_LOCATION_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(raw.parse().map_err(|_| ConfigError::Invalid {
                key: "DEVICE_LOCATION_TIMEOUT_SECS",
                value: raw,
            })?),
            None => Duration::from_secs(Self::DEFAULT_DEVICE_TIMEOUT_SECS),
        };

        Ok(Self {
            port,
            aws_region: get("AWS_REGION"),
            s3_bucket: require("S3_BUCKET_NAME")?,
            public_asset_base_url: get("PUBLIC_ASSET_BASE_URL"),
            scans_table: require("DYNAMODB_SCANS_TABLE")?,
            breeds_table: require("DYNAMODB_BREEDS_TABLE")?,
            sightings_table: require("DYNAMODB_SIGHTINGS_TABLE")?,
            jwt_secret: require("JWT_SECRET")?,
            classifier_url: get("CLASSIFIER_URL"),
            classifier_config: get("CLASSIFIER_CONFIG").map(PathBuf::from),
            ipinfo_base_url: get("IPINFO_BASE_URL")
                .unwrap_or_else(|| Self::DEFAULT_IPINFO_BASE_URL.to_string()),
            ipinfo_token: get("IPINFO_TOKEN"),
            device_location_timeout,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("S3_BUCKET_NAME", "breedscan-images"),
            ("DYNAMODB_SCANS_TABLE", "scans"),
            ("DYNAMODB_BREEDS_TABLE", "breeds"),
            ("DYNAMODB_SIGHTINGS_TABLE", "sightings"),
            ("JWT_SECRET", "secret"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_apply() {
        let config = load(&base()).unwrap();
        assert_eq!(config.port, 8081);
        assert_eq!(config.device_location_timeout, Duration::from_secs(10));
        assert_eq!(config.ipinfo_base_url, "https://ipinfo.io");
        assert!(config.classifier_url.is_none());
        assert_eq!(config.bind_address(), "0.0.0.0:8081");
    }

    #[test]
    fn missing_bucket_is_reported() {
        let mut vars = base();
        vars.remove("S3_BUCKET_NAME");
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Missing("S3_BUCKET_NAME"))
        ));
    }

    #[test]
    fn blank_values_are_unset() {
        let mut vars = base();
        vars.insert("JWT_SECRET", "  ");
        vars.insert("IPINFO_TOKEN", "");
        assert!(matches!(load(&vars), Err(ConfigError::Missing("JWT_SECRET"))));
    }

    #[test]
    fn bad_port_is_rejected() {
        let mut vars = base();
        vars.insert("PORT", "eighty");
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid { key: "PORT", .. })
        ));
    }
}
