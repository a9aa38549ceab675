//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain    | Description                                  |
//! |---------|-----------|----------------------------------------------|
//! | 0       | Universal | Success                                      |
//! | 1       | Universal | General error (unspecified)                  |
//! | 2       | Universal | CLI usage error (bad args, missing options)  |
//! | 3-4     | Universal | Input/output and parse errors                |
//! | 50-59   | census    | Census endpoint calls                        |
//! | 60-69   | derive    | Row rules                                    |
//!
//! Per-row failures (an address that did not geocode, an ACS5 chunk that
//! failed) are reported in the output's `status` column and do not
//! change the exit code.
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use acstools_census::CensusError;

// =============================================================================
// Universal (0-4)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// Cannot read input or write output.
pub const EXIT_IO: u8 = 3;

/// Input file could not be parsed (CSV, settings).
pub const EXIT_PARSE: u8 = 4;

// =============================================================================
// Census (50-59)
// =============================================================================

/// Request rejected before any per-row traffic: missing columns,
/// unsupported geography, bad year, unknown ACS5 variables.
pub const EXIT_CENSUS_VALIDATION: u8 = 50;

/// ACS5 variable catalog or TIGER/Line listing could not be fetched.
pub const EXIT_CENSUS_UNAVAILABLE: u8 = 51;

/// A shape archive failed to download or decode.
pub const EXIT_CENSUS_UPSTREAM: u8 = 52;

// =============================================================================
// Derive (60-69)
// =============================================================================

/// At least one rule failed and `--strict` was given.
pub const EXIT_RULES_FAILED: u8 = 60;

/// Map a Census error to its exit code.
pub fn census_exit_code(err: &CensusError) -> u8 {
    match err {
        CensusError::MissingColumns(_)
        | CensusError::InvalidArgument(_)
        | CensusError::InvalidVariables { .. } => EXIT_CENSUS_VALIDATION,
        CensusError::CatalogUnavailable { .. } | CensusError::ListingUnavailable { .. } => {
            EXIT_CENSUS_UNAVAILABLE
        }
        CensusError::Download { .. } | CensusError::Shapefile { .. } => EXIT_CENSUS_UPSTREAM,
        CensusError::Client(_) => EXIT_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_census_codes_in_range() {
        let errors = [
            CensusError::MissingColumns(vec!["ID".into()]),
            CensusError::InvalidVariables { year: 2019, names: vec!["X".into()] },
            CensusError::CatalogUnavailable { year: 2019, detail: String::new() },
            CensusError::Shapefile { url: String::new(), detail: String::new() },
        ];
        for err in &errors {
            assert!((50..60).contains(&census_exit_code(err)), "{:?}", err);
        }
    }
}
