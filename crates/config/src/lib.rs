// Configuration loading

pub mod api_key;
pub mod error;
pub mod settings;

pub use api_key::{resolve_api_key, KeyLookup, KeySource, API_KEY_ENV};
pub use error::ConfigError;
pub use settings::{AcsSettings, CensusEndpoints, GeocoderSettings, HttpSettings, Settings};
