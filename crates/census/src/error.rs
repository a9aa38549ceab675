use std::fmt;

/// A failed HTTP exchange. Always row- or file-local; callers decide
/// whether it is fatal.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Connection, timeout, or TLS failure
    Network(String),
    /// Server answered with a non-200 status
    Status(u16),
    /// Response body could not be read
    Body(String),
    /// Request URL could not be built
    Url(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Network(msg) => write!(f, "network error: {}", msg),
            FetchError::Status(code) => write!(f, "HTTP {}", code),
            FetchError::Body(msg) => write!(f, "failed to read response body: {}", msg),
            FetchError::Url(msg) => write!(f, "invalid URL: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

/// Errors that abort a whole geocode/ACS5/shapes call.
#[derive(Debug, Clone, PartialEq)]
pub enum CensusError {
    /// Input table lacks required columns
    MissingColumns(Vec<String>),
    /// Unsupported geography, bad year, empty variable list, ...
    InvalidArgument(String),
    /// Requested variables absent from the year's catalog (sorted)
    InvalidVariables { year: u16, names: Vec<String> },
    /// Variables catalog could not be fetched or parsed
    CatalogUnavailable { year: u16, detail: String },
    /// TIGER/Line directory listing could not be fetched
    ListingUnavailable { url: String, detail: String },
    /// A shape archive could not be downloaded
    Download { url: String, detail: String },
    /// A shape archive could not be decoded
    Shapefile { url: String, detail: String },
    /// HTTP client could not be constructed
    Client(String),
}

/// Check every required column up front so the report lists all of them.
pub(crate) fn require_columns(
    table: &acstools_table::Table,
    names: &[&str],
) -> Result<(), CensusError> {
    let missing: Vec<String> = names
        .iter()
        .filter(|name| !table.has_column(name))
        .map(|name| name.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(CensusError::MissingColumns(missing))
    }
}

impl fmt::Display for CensusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CensusError::MissingColumns(cols) => {
                let quoted: Vec<String> = cols.iter().map(|c| format!("'{}'", c)).collect();
                write!(f, "required column(s) missing from input: {}", quoted.join(", "))
            }
            CensusError::InvalidArgument(msg) => write!(f, "{}", msg),
            CensusError::InvalidVariables { year, names } => write!(
                f,
                "variables not available from ACS5 {}: {}",
                year,
                names.join(", ")
            ),
            CensusError::CatalogUnavailable { year, detail } => {
                write!(f, "ACS5 is not available for requested year {} ({})", year, detail)
            }
            CensusError::ListingUnavailable { url, detail } => {
                write!(f, "failed to find the shape file listing at {} ({})", url, detail)
            }
            CensusError::Download { url, detail } => {
                write!(f, "failed to download {} ({})", url, detail)
            }
            CensusError::Shapefile { url, detail } => {
                write!(f, "failed to read shapes from {}: {}", url, detail)
            }
            CensusError::Client(msg) => write!(f, "failed to build HTTP client: {}", msg),
        }
    }
}

impl std::error::Error for CensusError {}
