//! `acstools geocode | acs5 | shapes | geographies`

use std::path::PathBuf;

use acstools_census::{Acs5Fetcher, CensusError, GeographyLevel, Geocoder, ShapeFetcher, ShapeRequest};
use acstools_config::{resolve_api_key, KeySource, Settings, API_KEY_ENV};

use crate::exit_codes::census_exit_code;
use crate::{read_table, show_progress, write_table, CliError};

impl From<CensusError> for CliError {
    fn from(err: CensusError) -> Self {
        let code = census_exit_code(&err);
        let hint = match &err {
            CensusError::MissingColumns(_) => Some("check the input CSV header row".to_string()),
            CensusError::InvalidArgument(msg) if msg.contains("geography") => {
                Some("run `acstools geographies` for the supported list".to_string())
            }
            CensusError::InvalidVariables { year, .. } => Some(format!(
                "see https://api.census.gov/data/{}/acs/acs5/variables.html",
                year
            )),
            CensusError::CatalogUnavailable { .. } => {
                Some("try another --year; ACS5 releases lag the survey year".to_string())
            }
            _ => None,
        };
        CliError { code, message: err.to_string(), hint }
    }
}

pub(crate) fn cmd_geocode(
    settings: &Settings,
    input: PathBuf,
    geography: String,
    benchmark: Option<String>,
    vintage: Option<String>,
    out: Option<PathBuf>,
    quiet: bool,
) -> Result<(), CliError> {
    let addresses = read_table(&input)?;

    let mut geocoder = Geocoder::new(settings)?;
    if let Some(benchmark) = benchmark {
        geocoder = geocoder.benchmark(benchmark);
    }
    if let Some(vintage) = vintage {
        geocoder = geocoder.vintage(vintage);
    }

    let report = geocoder.geocode(&addresses, &geography)?;
    let out_label = write_table(&report.to_table(), &out)?;

    if show_progress(quiet) {
        eprintln!(
            "geocoded {}/{} addresses to {} -> {}",
            report.matched_count(),
            report.records.len(),
            geography,
            out_label,
        );
        if !report.unknown_geographies.is_empty() {
            eprintln!("new geographies: {}", report.unknown_geographies.join(", "));
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_acs5(
    settings: &Settings,
    input: PathBuf,
    vars: Vec<String>,
    vars_file: Option<PathBuf>,
    year: Option<u16>,
    api_key: Option<String>,
    out: Option<PathBuf>,
    quiet: bool,
) -> Result<(), CliError> {
    let variables = collect_variables(&vars, vars_file.as_ref())?;
    if variables.is_empty() {
        return Err(CliError::args("no ACS5 variables requested")
            .with_hint("use --var B01001_001E or --vars-file FILE"));
    }

    let geocodes = read_table(&input)?;
    let year = year.unwrap_or(settings.acs.default_year);

    let key = resolve_api_key(api_key.as_deref());
    match key.source {
        KeySource::None => tracing::debug!("no API key (set {} to add one)", API_KEY_ENV),
        source => tracing::debug!(source = source.as_str(), "using Census API key"),
    }

    let fetcher = Acs5Fetcher::new(settings, key.key)?;
    let table = fetcher.fetch(&geocodes, &variables, year)?;
    let out_label = write_table(&table, &out)?;

    if show_progress(quiet) {
        eprintln!(
            "fetched {} variable(s) for {} row(s), ACS5 {} -> {}",
            variables.len(),
            table.len(),
            year,
            out_label,
        );
    }
    Ok(())
}

/// `--var` values (comma-separated accepted) followed by `--vars-file` lines.
fn collect_variables(vars: &[String], vars_file: Option<&PathBuf>) -> Result<Vec<String>, CliError> {
    let mut variables: Vec<String> = vars
        .iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();

    if let Some(path) = vars_file {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CliError::io(format!("cannot read {}: {}", path.display(), e)))?;
        variables.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string),
        );
    }

    Ok(variables)
}

pub(crate) fn cmd_shapes(
    settings: &Settings,
    abbrev: String,
    year: String,
    out: Option<PathBuf>,
    quiet: bool,
) -> Result<(), CliError> {
    let request = ShapeRequest::new(&abbrev, &year)?;
    let fetcher = ShapeFetcher::new(settings)?;
    let table = fetcher.fetch(&request)?;
    let out_label = write_table(&table, &out)?;

    if show_progress(quiet) {
        eprintln!(
            "{} {} shapes for {} -> {}",
            table.len(),
            request.level.code(),
            request.year,
            out_label,
        );
    }
    Ok(())
}

pub(crate) fn cmd_geographies(json: bool) -> Result<(), CliError> {
    if json {
        let levels: Vec<serde_json::Value> = GeographyLevel::ALL
            .iter()
            .map(|level| {
                serde_json::json!({
                    "name": level.name(),
                    "code": level.code(),
                    "geocodable": level.is_geocodable(),
                })
            })
            .collect();
        let text = serde_json::to_string_pretty(&levels)
            .map_err(|e| CliError::general(format!("JSON encode error: {}", e)))?;
        println!("{}", text);
        return Ok(());
    }

    println!("{:<38} {:<7} geocode", "name", "code");
    for level in GeographyLevel::ALL {
        println!(
            "{:<38} {:<7} {}",
            level.name(),
            level.code(),
            if level.is_geocodable() { "yes" } else { "no" },
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_variables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vars.txt");
        std::fs::write(&path, "# population\nB01001_001E\n\n  B19013_001E  \n").unwrap();

        let vars = vec!["B01001_002E, B01001_026E".to_string(), "B01003_001E".to_string()];
        let all = collect_variables(&vars, Some(&path)).unwrap();
        assert_eq!(
            all,
            vec!["B01001_002E", "B01001_026E", "B01003_001E", "B01001_001E", "B19013_001E"]
        );
    }

    #[test]
    fn test_missing_vars_file_is_io_error() {
        let err = collect_variables(&[], Some(&PathBuf::from("/nonexistent/vars.txt"))).unwrap_err();
        assert_eq!(err.code, crate::exit_codes::EXIT_IO);
    }

    #[test]
    fn test_census_error_hint() {
        let err: CliError = CensusError::InvalidVariables { year: 2019, names: vec!["X".into()] }.into();
        assert_eq!(err.code, 50);
        assert!(err.hint.unwrap().contains("2019"));
    }
}
