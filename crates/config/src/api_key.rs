// Census API key lookup
//
// Keys come from, in order:
// 1. An explicit value (command-line flag)
// 2. The CENSUS_API_KEY environment variable
// 3. System keychain (with the `keychain` feature)
//
// Keys are NEVER stored in settings.json

use std::env;

/// Environment variable holding the Census API key
pub const API_KEY_ENV: &str = "CENSUS_API_KEY";

/// Service name for keychain storage
#[cfg_attr(not(feature = "keychain"), allow(dead_code))]
const KEYCHAIN_SERVICE: &str = "acstools";

#[cfg_attr(not(feature = "keychain"), allow(dead_code))]
const KEYCHAIN_ACCOUNT: &str = "census-api";

/// Source of an API key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Passed explicitly by the caller
    Flag,
    /// Key retrieved from environment variable
    Environment,
    /// Key retrieved from system keychain
    Keychain,
    /// No key found
    None,
}

impl KeySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySource::Flag => "flag",
            KeySource::Environment => "environment",
            KeySource::Keychain => "keychain",
            KeySource::None => "none",
        }
    }
}

/// Result of key lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLookup {
    pub key: Option<String>,
    pub source: KeySource,
}

impl KeyLookup {
    fn none() -> Self {
        KeyLookup {
            key: None,
            source: KeySource::None,
        }
    }
}

/// Resolve the Census API key. Blank values are treated as absent.
pub fn resolve_api_key(flag: Option<&str>) -> KeyLookup {
    let lookup = resolve_with(flag, env::var(API_KEY_ENV).ok());
    if lookup.key.is_some() {
        return lookup;
    }
    keychain_lookup().unwrap_or_else(KeyLookup::none)
}

fn resolve_with(flag: Option<&str>, env_value: Option<String>) -> KeyLookup {
    if let Some(key) = flag.map(str::trim).filter(|k| !k.is_empty()) {
        return KeyLookup {
            key: Some(key.to_string()),
            source: KeySource::Flag,
        };
    }

    if let Some(key) = env_value.filter(|k| !k.trim().is_empty()) {
        return KeyLookup {
            key: Some(key.trim().to_string()),
            source: KeySource::Environment,
        };
    }

    KeyLookup::none()
}

#[cfg(feature = "keychain")]
fn keychain_lookup() -> Option<KeyLookup> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, KEYCHAIN_ACCOUNT).ok()?;
    let key = entry.get_password().ok()?;
    Some(KeyLookup {
        key: Some(key),
        source: KeySource::Keychain,
    })
}

#[cfg(not(feature = "keychain"))]
fn keychain_lookup() -> Option<KeyLookup> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_wins_over_env() {
        let lookup = resolve_with(Some("from-flag"), Some("from-env".into()));
        assert_eq!(lookup.key.as_deref(), Some("from-flag"));
        assert_eq!(lookup.source, KeySource::Flag);
    }

    #[test]
    fn test_env_fallback() {
        let lookup = resolve_with(None, Some(" from-env ".into()));
        assert_eq!(lookup.key.as_deref(), Some("from-env"));
        assert_eq!(lookup.source.as_str(), "environment");
    }

    #[test]
    fn test_blank_values_are_absent() {
        let lookup = resolve_with(Some("  "), Some(String::new()));
        assert_eq!(lookup, KeyLookup::none());
    }
}
