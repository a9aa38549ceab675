//! `acstools-census` - clients for the Census Bureau web APIs.
//!
//! - [`geocoder::Geocoder`]: addresses to geography GEOIDs
//! - [`acs5::Acs5Fetcher`]: ACS 5-year variables per block group
//! - [`shapes::ShapeFetcher`]: TIGER/Line shapes as a WKT table
//!
//! All three are blocking and single-threaded. Pre-flight problems
//! (missing columns, unsupported geography, unknown variables) return
//! `Err(CensusError)` before any per-row request; per-row failures are
//! reported in each output record's status.

pub mod acs5;
pub mod client;
pub mod error;
pub mod geocoder;
pub mod geography;
pub mod geoid;
pub mod shapefile;
pub mod shapes;

pub use acs5::Acs5Fetcher;
pub use client::{FetchClient, RetryPolicy};
pub use error::{CensusError, FetchError};
pub use geocoder::{GeocodeRecord, GeocodeReport, Geocoder};
pub use geography::GeographyLevel;
pub use geoid::BlockGroupGeoid;
pub use shapes::{ShapeFetcher, ShapeRequest};
