//! ACS 5-year statistics for block groups.
//!
//! The variable list is checked once against the year's catalog, then
//! each row is fetched in chunks of at most [`CHUNK_SIZE`] variables (the
//! API rejects requests with 50 or more `get` fields). A chunk that fails
//! leaves only its own variables empty.

use std::collections::HashSet;

use acstools_config::Settings;
use acstools_table::{Table, Value};
use serde_json::Value as Json;

use crate::client::{build_url, FetchClient};
use crate::error::{require_columns, CensusError};
use crate::geoid::BlockGroupGeoid;

/// Variables per request; `NAME` takes the 50th slot.
pub const CHUNK_SIZE: usize = 49;

pub struct Acs5Fetcher {
    client: FetchClient,
    api_base: String,
    api_key: Option<String>,
}

impl Acs5Fetcher {
    pub fn new(settings: &Settings, api_key: Option<String>) -> Result<Self, CensusError> {
        let client = FetchClient::from_settings(&settings.http)?;
        Ok(Self::with_base_url(client, settings.census.api_base.clone(), api_key))
    }

    pub fn with_base_url(client: FetchClient, api_base: String, api_key: Option<String>) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Names of every variable published for `year`.
    pub fn fetch_catalog(&self, year: u16) -> Result<HashSet<String>, CensusError> {
        let unavailable = |detail: String| CensusError::CatalogUnavailable { year, detail };

        let url = build_url(
            &format!("{}/data/{}/acs/acs5/variables.json", self.api_base, year),
            &[],
        )
        .map_err(|e| unavailable(e.to_string()))?;

        let body = self
            .client
            .get_text(&url)
            .map_err(|e| unavailable(e.to_string()))?;
        let json: Json =
            serde_json::from_str(&body).map_err(|e| unavailable(format!("bad catalog JSON: {}", e)))?;
        let variables = json["variables"]
            .as_object()
            .ok_or_else(|| unavailable("catalog has no 'variables' object".to_string()))?;

        tracing::debug!(year, count = variables.len(), "loaded ACS5 variable catalog");
        Ok(variables.keys().cloned().collect())
    }

    /// Append the requested ACS5 variables to each row of `geocodes`
    /// (`ID`, `GEOID`). Output columns: `ID`, `status`, `GEOID`, then the
    /// variables in request order.
    pub fn fetch(&self, geocodes: &Table, variables: &[String], year: u16) -> Result<Table, CensusError> {
        require_columns(geocodes, &["ID", "GEOID"])?;
        let variables = dedup_preserving_order(variables);
        if variables.is_empty() {
            return Err(CensusError::InvalidArgument(
                "at least one ACS5 variable is required".to_string(),
            ));
        }

        let catalog = self.fetch_catalog(year)?;
        let invalid = invalid_variables(&variables, &catalog);
        if !invalid.is_empty() {
            return Err(CensusError::InvalidVariables { year, names: invalid });
        }

        if self.api_key.is_none() {
            tracing::warn!("no Census API key configured; sending keyless requests");
        }

        let chunks = chunk_variables(&variables);
        tracing::info!(
            rows = geocodes.len(),
            variables = variables.len(),
            chunks = chunks.len(),
            year,
            "fetching ACS5 data"
        );

        let mut columns = vec!["ID".to_string(), "status".to_string(), "GEOID".to_string()];
        columns.extend(variables.iter().cloned());
        let mut output = Table::new(columns);

        for row in geocodes.rows() {
            let id = row.get("ID").cloned().unwrap_or_default();
            let geoid_cell = row.get("GEOID").cloned().unwrap_or_default();
            let mut values = vec![Value::Empty; variables.len()];

            let status = match BlockGroupGeoid::parse(&geoid_cell.to_text()) {
                Ok(geoid) => {
                    let mut narrative = Vec::with_capacity(chunks.len());
                    for (n, chunk) in chunks.iter().enumerate() {
                        match self.fetch_chunk(&geoid, chunk, year) {
                            Ok(chunk_values) => {
                                let start = n * CHUNK_SIZE;
                                values[start..start + chunk_values.len()].clone_from_slice(&chunk_values);
                                narrative.push(format!("Chunk {} succeeded.", n));
                            }
                            Err(e) => {
                                tracing::debug!(id = %id, chunk = n, error = %e, "ACS5 chunk failed");
                                narrative.push(format!("Chunk {} failed.", n));
                            }
                        }
                    }
                    narrative.join(" ")
                }
                Err(e) => {
                    tracing::warn!(id = %id, "{}", e);
                    e
                }
            };

            let mut out_row = vec![id, Value::text(status), geoid_cell];
            out_row.extend(values);
            output.push_row(out_row);
        }

        Ok(output)
    }

    fn fetch_chunk(&self, geoid: &BlockGroupGeoid, chunk: &[String], year: u16) -> Result<Vec<Value>, String> {
        let get = format!("NAME,{}", chunk.join(","));
        let for_bg = format!("block group:{}", geoid.block_group());
        let in_state = format!("state:{}", geoid.state());
        let in_county = format!("county:{}", geoid.county());
        let in_tract = format!("tract:{}", geoid.tract());

        let mut params = vec![
            ("get", get.as_str()),
            ("for", for_bg.as_str()),
            ("in", in_state.as_str()),
            ("in", in_county.as_str()),
            ("in", in_tract.as_str()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("key", key.as_str()));
        }

        let url = build_url(&format!("{}/data/{}/acs/acs5", self.api_base, year), &params)
            .map_err(|e| e.to_string())?;
        let body = self.client.get_text(&url).map_err(|e| e.to_string())?;
        parse_chunk_response(&body, chunk)
    }
}

/// Split variables into request-sized chunks, order preserved.
pub fn chunk_variables(variables: &[String]) -> Vec<&[String]> {
    variables.chunks(CHUNK_SIZE).collect()
}

/// Requested names missing from the catalog, sorted and de-duplicated.
pub fn invalid_variables(requested: &[String], catalog: &HashSet<String>) -> Vec<String> {
    let mut invalid: Vec<String> = requested
        .iter()
        .filter(|v| !catalog.contains(v.as_str()))
        .cloned()
        .collect();
    invalid.sort();
    invalid.dedup();
    invalid
}

fn dedup_preserving_order(variables: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    variables
        .iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && seen.insert(v.clone()))
        .collect()
}

/// Parse a `[[header...], [values...]]` response, picking each chunk
/// variable by header name. All-or-nothing.
pub fn parse_chunk_response(body: &str, chunk: &[String]) -> Result<Vec<Value>, String> {
    let rows: Vec<Vec<Json>> =
        serde_json::from_str(body).map_err(|e| format!("bad response JSON: {}", e))?;
    let (header, values) = match rows.as_slice() {
        [header, values, ..] => (header, values),
        _ => return Err("response has no data row".to_string()),
    };

    chunk
        .iter()
        .map(|var| {
            let idx = header
                .iter()
                .position(|h| h.as_str() == Some(var.as_str()))
                .ok_or_else(|| format!("response lacks column {}", var))?;
            match values.get(idx) {
                None | Some(Json::Null) => Ok(Value::Empty),
                Some(Json::Number(n)) => Ok(n.as_f64().map(Value::Number).unwrap_or_default()),
                Some(Json::String(s)) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Number)
                    .map_err(|_| format!("{} value '{}' is not numeric", var, s)),
                Some(other) => Err(format!("{} value {} is not numeric", var, other)),
            }
        })
        .collect()
}
