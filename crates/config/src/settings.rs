// Application settings
// Loaded from ~/.config/acstools/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_GEOCODER_URL: &str =
    "https://geocoding.geo.census.gov/geocoder/geographies/onelineaddress";
pub const DEFAULT_API_BASE: &str = "https://api.census.gov";
pub const DEFAULT_TIGER_BASE: &str = "https://www2.census.gov";

/// Census endpoint base URLs. Overridable for mirrors and tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CensusEndpoints {
    pub geocoder_url: String,
    pub api_base: String,
    pub tiger_base: String,
}

impl Default for CensusEndpoints {
    fn default() -> Self {
        Self {
            geocoder_url: DEFAULT_GEOCODER_URL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            tiger_base: DEFAULT_TIGER_BASE.to_string(),
        }
    }
}

impl CensusEndpoints {
    /// Point every endpoint at one server (used with mock servers).
    pub fn all_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            geocoder_url: format!("{}/geocoder/geographies/onelineaddress", base),
            api_base: base.to_string(),
            tiger_base: base.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderSettings {
    /// Snapshot of the address ranges used for matching
    pub benchmark: String,
    /// Geography edition the match is linked to
    pub vintage: String,
}

impl Default for GeocoderSettings {
    fn default() -> Self {
        Self {
            benchmark: "Public_AR_Current".to_string(),
            vintage: "Census2010_Current".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcsSettings {
    /// ACS 5-year publication year used when none is given
    pub default_year: u16,
}

impl Default for AcsSettings {
    fn default() -> Self {
        Self { default_year: 2019 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    /// Wait before the second geocoder attempt; doubles after that
    pub retry_backoff_ms: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retry_backoff_ms: 1000,
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub census: CensusEndpoints,
    pub geocoder: GeocoderSettings,
    pub acs: AcsSettings,
    pub http: HttpSettings,
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("acstools");
        config_dir.join("settings.json")
    }

    /// Load settings from the default location, falling back to defaults
    /// when the file is absent or unreadable.
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("{}; using default settings", e);
                Self::default()
            }
        }
    }

    /// Load settings from an explicit path. Errors are reported, not defaulted.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&contents)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))
    }

    /// Parse settings JSON. Lines starting with `//` are comments.
    pub fn from_json(contents: &str) -> Result<Self, String> {
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");

        serde_json::from_str(&cleaned).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.census.api_base, "https://api.census.gov");
        assert_eq!(s.geocoder.benchmark, "Public_AR_Current");
        assert_eq!(s.geocoder.vintage, "Census2010_Current");
        assert_eq!(s.acs.default_year, 2019);
        assert_eq!(s.http.retry_backoff(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_json_with_comments() {
        let json = r#"{
            // use the 2020 vintage
            "geocoder": { "vintage": "Census2020_Current" },
            "http": { "retry_backoff_ms": 0 }
        }"#;
        let s = Settings::from_json(json).unwrap();
        assert_eq!(s.geocoder.vintage, "Census2020_Current");
        assert_eq!(s.geocoder.benchmark, "Public_AR_Current");
        assert_eq!(s.http.retry_backoff_ms, 0);
        assert_eq!(s.http.timeout_secs, 30);
    }

    #[test]
    fn test_load_from_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load_from(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "// local mirror\n{ \"acs\": { \"default_year\": 2021 } }\n").unwrap();

        let s = Settings::load_from(&path).unwrap();
        assert_eq!(s.acs.default_year, 2021);
        assert_eq!(s.census, CensusEndpoints::default());

        fs::write(&path, "{ \"acs\": ").unwrap();
        assert!(matches!(Settings::load_from(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_endpoints_all_at() {
        let e = CensusEndpoints::all_at("http://127.0.0.1:9000/");
        assert_eq!(e.geocoder_url, "http://127.0.0.1:9000/geocoder/geographies/onelineaddress");
        assert_eq!(e.api_base, "http://127.0.0.1:9000");
    }
}
