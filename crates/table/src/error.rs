use std::fmt;

#[derive(Debug)]
pub enum TableError {
    /// The same column name appears twice in a header.
    DuplicateColumn(String),
    /// CSV parse error (bad quoting, invalid UTF-8 after fallback, etc.).
    Parse(String),
    /// IO error (file open, write, flush).
    Io(String),
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateColumn(name) => write!(f, "duplicate column '{name}'"),
            Self::Parse(msg) => write!(f, "CSV parse error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for TableError {}
