//! Address geocoding against the Census one-line-address endpoint.
//!
//! One request per input row (with retry), one record per input row.
//! Every failure after pre-flight validation is row-local and lands in
//! the record's `status`.

use std::time::Duration;

use acstools_config::Settings;
use acstools_table::{Table, Value};
use serde_json::Value as Json;

use crate::client::{build_url, FetchClient, RetryPolicy};
use crate::error::{require_columns, CensusError};
use crate::geography::{normalize_geography_key, GeographyLevel};

pub const GEOCODE_ATTEMPTS: u32 = 3;

pub const STATUS_REQUEST_FAILED: &str = "request attempt failed";
pub const STATUS_XML_RESPONSE: &str = "XML response from census endpoint";
pub const STATUS_JSON_FAILED: &str = "JSON load of response text failed";
pub const STATUS_UNEXPECTED_SHAPE: &str = "Unexpected response shape";
pub const STATUS_NO_MATCH: &str = "No addresses matched";
pub const STATUS_NOT_RETURNED: &str = "Requested geography not returned";

const SNIPPET_LEN: usize = 200;

/// One geocoded input row.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeRecord {
    pub id: Value,
    pub status: String,
    /// GEOID on success, otherwise a diagnostic (request URL, body snippet)
    pub result: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeocodeReport {
    pub records: Vec<GeocodeRecord>,
    /// Geography keys in responses that are not in the level table,
    /// first-seen order, no duplicates
    pub unknown_geographies: Vec<String>,
}

impl GeocodeReport {
    /// `ID,status,result` table, one row per record.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new(["ID", "status", "result"]);
        for record in &self.records {
            table.push_row(vec![
                record.id.clone(),
                Value::text(record.status.as_str()),
                Value::from_field(&record.result),
            ]);
        }
        table
    }

    pub fn matched_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status.ends_with(" found"))
            .count()
    }
}

pub struct Geocoder {
    client: FetchClient,
    endpoint: String,
    benchmark: String,
    vintage: String,
    retry: RetryPolicy,
}

impl Geocoder {
    pub fn new(settings: &Settings) -> Result<Self, CensusError> {
        let client = FetchClient::from_settings(&settings.http)?;
        Ok(Self {
            client,
            endpoint: settings.census.geocoder_url.clone(),
            benchmark: settings.geocoder.benchmark.clone(),
            vintage: settings.geocoder.vintage.clone(),
            retry: RetryPolicy::new(GEOCODE_ATTEMPTS, settings.http.retry_backoff()),
        })
    }

    /// Geocoder against an explicit endpoint with default benchmark and
    /// vintage and no backoff between attempts.
    pub fn with_endpoint(client: FetchClient, endpoint: String) -> Self {
        let defaults = acstools_config::GeocoderSettings::default();
        Self {
            client,
            endpoint,
            benchmark: defaults.benchmark,
            vintage: defaults.vintage,
            retry: RetryPolicy::new(GEOCODE_ATTEMPTS, Duration::ZERO),
        }
    }

    pub fn benchmark(mut self, benchmark: impl Into<String>) -> Self {
        self.benchmark = benchmark.into();
        self
    }

    pub fn vintage(mut self, vintage: impl Into<String>) -> Self {
        self.vintage = vintage.into();
        self
    }

    /// Geocode every row of `addresses` (`ID`, `street`, `zipcode`) to the
    /// requested geography level name, e.g. "Census Tracts".
    pub fn geocode(&self, addresses: &Table, requested: &str) -> Result<GeocodeReport, CensusError> {
        require_columns(addresses, &["ID", "street", "zipcode"])?;
        let level = GeographyLevel::from_name(requested)
            .filter(GeographyLevel::is_geocodable)
            .ok_or_else(|| {
                let supported: Vec<&str> = GeographyLevel::geocodable().map(|l| l.name()).collect();
                CensusError::InvalidArgument(format!(
                    "requested geography '{}' is not in the supported list: {}",
                    requested,
                    supported.join(", ")
                ))
            })?;

        tracing::info!(rows = addresses.len(), geography = %level, "geocoding addresses");

        let mut report = GeocodeReport::default();
        for row in addresses.rows() {
            let id = row.get("ID").cloned().unwrap_or_default();
            let (status, result) = self.geocode_one(
                &row.text("street"),
                &row.text("zipcode"),
                level,
                &mut report.unknown_geographies,
            );
            tracing::debug!(id = %id, status = %status, "geocoded");
            report.records.push(GeocodeRecord { id, status, result });
        }

        if !report.unknown_geographies.is_empty() {
            tracing::warn!(
                keys = ?report.unknown_geographies,
                "geocoder returned geographies not in the level table"
            );
        }
        tracing::info!(
            matched = report.matched_count(),
            total = report.records.len(),
            "geocoding finished"
        );

        Ok(report)
    }

    fn geocode_one(
        &self,
        street: &str,
        zipcode: &str,
        level: GeographyLevel,
        unknown: &mut Vec<String>,
    ) -> (String, String) {
        let address = format!("{}, {}", sanitize_street(street), zipcode.trim());
        let url = match build_url(
            &self.endpoint,
            &[
                ("address", address.as_str()),
                ("benchmark", self.benchmark.as_str()),
                ("vintage", self.vintage.as_str()),
                ("format", "json"),
            ],
        ) {
            Ok(url) => url,
            Err(e) => return (STATUS_REQUEST_FAILED.to_string(), e.to_string()),
        };

        let body = match self.client.get_text_with_retry(&url, &self.retry) {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "geocoder request failed");
                return (STATUS_REQUEST_FAILED.to_string(), url.to_string());
            }
        };

        classify_response(&body, level, unknown)
    }
}

/// Keep the street text before any unit marker or comma.
pub fn sanitize_street(street: &str) -> &str {
    let before_unit = street.split('#').next().unwrap_or_default();
    before_unit.split(',').next().unwrap_or_default().trim()
}

/// Turn a geocoder response body into `(status, result)`.
pub fn classify_response(
    body: &str,
    level: GeographyLevel,
    unknown: &mut Vec<String>,
) -> (String, String) {
    if body.trim_start().starts_with("<?xml") {
        return (STATUS_XML_RESPONSE.to_string(), snippet(body));
    }

    let json: Json = match serde_json::from_str(body) {
        Ok(json) => json,
        Err(_) => return (STATUS_JSON_FAILED.to_string(), snippet(body)),
    };

    let matches = match json["result"]["addressMatches"].as_array() {
        Some(matches) => matches,
        None => return (STATUS_UNEXPECTED_SHAPE.to_string(), snippet(body)),
    };

    let first = match matches.first() {
        Some(first) => first,
        None => return (STATUS_NO_MATCH.to_string(), String::new()),
    };

    let geographies = match first["geographies"].as_object() {
        Some(geographies) => geographies,
        None => return (STATUS_UNEXPECTED_SHAPE.to_string(), snippet(body)),
    };

    let requested = level.name();
    let mut found: Option<&str> = None;
    for key in geographies.keys() {
        let normalized = normalize_geography_key(key);
        let known = GeographyLevel::from_name(normalized).is_some_and(|l| l.is_geocodable());
        if !known {
            if !unknown.iter().any(|k| k == key) {
                unknown.push(key.clone());
            }
            continue;
        }
        if normalized != requested {
            continue;
        }
        // Exact key beats a year-prefixed one
        if key == requested || found.is_none() {
            found = Some(key.as_str());
        }
    }

    let key = match found {
        Some(key) => key,
        None => return (STATUS_NOT_RETURNED.to_string(), String::new()),
    };

    match geographies[key][0]["GEOID"].as_str() {
        Some(geoid) => (format!("{} found", key), geoid.to_string()),
        None => (STATUS_UNEXPECTED_SHAPE.to_string(), snippet(body)),
    }
}

fn snippet(body: &str) -> String {
    body.chars().take(SNIPPET_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classify(body: &str, level: GeographyLevel) -> (String, String, Vec<String>) {
        let mut unknown = Vec::new();
        let (status, result) = classify_response(body, level, &mut unknown);
        (status, result, unknown)
    }

    fn response(geographies: Json) -> String {
        json!({
            "result": {
                "input": {},
                "addressMatches": [{ "matchedAddress": "1 MAIN ST", "geographies": geographies }]
            }
        })
        .to_string()
    }

    #[test]
    fn test_sanitize_street() {
        assert_eq!(sanitize_street("123 Main St #4, Apt 2"), "123 Main St");
        assert_eq!(sanitize_street("123 Main St, Philadelphia"), "123 Main St");
        assert_eq!(sanitize_street("  9 Elm Ave  "), "9 Elm Ave");
        assert_eq!(sanitize_street("#5"), "");
    }

    #[test]
    fn test_found_tract() {
        let body = response(json!({
            "Census Tracts": [{ "GEOID": "42101000100" }],
            "States": [{ "GEOID": "42" }]
        }));
        let (status, result, unknown) = classify(&body, GeographyLevel::CensusTracts);
        assert_eq!(status, "Census Tracts found");
        assert_eq!(result, "42101000100");
        assert!(unknown.is_empty());
    }

    #[test]
    fn test_year_prefixed_key_matches() {
        let body = response(json!({ "2020 Census Blocks": [{ "GEOID": "421010001001000" }] }));
        let (status, result, _) = classify(&body, GeographyLevel::CensusBlocks);
        assert_eq!(status, "2020 Census Blocks found");
        assert_eq!(result, "421010001001000");
    }

    #[test]
    fn test_exact_key_preferred() {
        let body = response(json!({
            "2020 Census Blocks": [{ "GEOID": "old" }],
            "Census Blocks": [{ "GEOID": "exact" }]
        }));
        let (status, result, _) = classify(&body, GeographyLevel::CensusBlocks);
        assert_eq!(status, "Census Blocks found");
        assert_eq!(result, "exact");
    }

    #[test]
    fn test_unknown_keys_collected() {
        let body = response(json!({
            "Urban Areas": [{ "GEOID": "1" }],
            "Census Tracts": [{ "GEOID": "2" }]
        }));
        let (_, _, unknown) = classify(&body, GeographyLevel::CensusTracts);
        assert_eq!(unknown, vec!["Urban Areas".to_string()]);
    }

    #[test]
    fn test_non_geocodable_levels_are_new() {
        let body = response(json!({
            "Census Block Groups": [{ "GEOID": "421010001001" }],
            "2020 Zip Code Tabulation Areas": [{ "GEOID": "19103" }],
            "Counties": [{ "GEOID": "42101" }]
        }));
        let (status, _, mut unknown) = classify(&body, GeographyLevel::Counties);
        unknown.sort();
        assert_eq!(status, "Counties found");
        assert_eq!(
            unknown,
            vec!["2020 Zip Code Tabulation Areas".to_string(), "Census Block Groups".to_string()]
        );
    }

    #[test]
    fn test_requested_geography_absent() {
        let body = response(json!({ "States": [{ "GEOID": "42" }] }));
        let (status, result, _) = classify(&body, GeographyLevel::Counties);
        assert_eq!(status, STATUS_NOT_RETURNED);
        assert_eq!(result, "");
    }

    #[test]
    fn test_body_classification() {
        let (status, _, _) = classify("<?xml version=\"1.0\"?><error/>", GeographyLevel::States);
        assert_eq!(status, STATUS_XML_RESPONSE);

        let (status, result, _) = classify("Service Unavailable", GeographyLevel::States);
        assert_eq!(status, STATUS_JSON_FAILED);
        assert_eq!(result, "Service Unavailable");

        let (status, _, _) = classify("{\"errors\": [\"bad\"]}", GeographyLevel::States);
        assert_eq!(status, STATUS_UNEXPECTED_SHAPE);

        let empty = json!({ "result": { "addressMatches": [] } }).to_string();
        let (status, _, _) = classify(&empty, GeographyLevel::States);
        assert_eq!(status, STATUS_NO_MATCH);
    }
}
