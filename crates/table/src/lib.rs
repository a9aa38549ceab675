//! `acstools-table` - the in-memory table every unit reads and produces.
//!
//! Cells stay text on import so identifiers such as GEOIDs and ZIP codes
//! keep their leading zeros; numeric interpretation happens where it is
//! needed (rule evaluation, ACS values).

pub mod csv;
pub mod error;
pub mod table;
pub mod value;

pub use error::TableError;
pub use table::{Row, Table};
pub use value::Value;
