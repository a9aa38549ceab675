// CSV/TSV import/export

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::TableError;
use crate::table::Table;
use crate::value::Value;

/// Read a delimited file with a header row. The delimiter is sniffed.
pub fn import(path: &Path) -> Result<Table, TableError> {
    let content = read_file_as_utf8(path)?;
    let delimiter = sniff_delimiter(&content);
    import_from_str(&content, delimiter)
}

/// Read a table from any reader (stdin, in-memory buffers).
pub fn import_from_reader<R: Read>(mut reader: R) -> Result<Table, TableError> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| TableError::Io(e.to_string()))?;
    let content = decode_bytes(bytes);
    let delimiter = sniff_delimiter(&content);
    import_from_str(&content, delimiter)
}

/// Detect the most likely field delimiter by checking consistency across the first few lines.
///
/// For each candidate (tab, semicolon, comma, pipe), count fields per line. The delimiter
/// that produces the most consistent field count (>1 field) wins.
fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content.lines().take(10).collect();

    if sample_lines.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        if counts.first().copied().unwrap_or(0) <= 1 {
            continue;
        }

        let target = counts[0];
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

/// Read file and convert to UTF-8 if needed (handles Windows-1252, Latin-1, etc.)
pub fn read_file_as_utf8(path: &Path) -> Result<String, TableError> {
    let mut file = std::fs::File::open(path)
        .map_err(|e| TableError::Io(format!("cannot open {}: {}", path.display(), e)))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| TableError::Io(format!("cannot read {}: {}", path.display(), e)))?;
    Ok(decode_bytes(bytes))
}

/// UTF-8 first; on failure fall back to Windows-1252 (common for Excel exports).
pub fn decode_bytes(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s.trim_start_matches('\u{feff}').to_string(),
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            decoded.into_owned()
        }
    }
}

pub fn import_from_str(content: &str, delimiter: u8) -> Result<Table, TableError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let header: Vec<String> = reader
        .headers()
        .map_err(|e| TableError::Parse(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let mut table = Table::with_header(header)?;

    for result in reader.records() {
        let record = result.map_err(|e| TableError::Parse(e.to_string()))?;
        // Skip fully blank lines
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        table.push_row(record.iter().map(Value::from_field).collect());
    }

    Ok(table)
}

/// Write a table (header + rows) to any writer.
pub fn export_to_writer<W: Write>(table: &Table, writer: W, delimiter: u8) -> Result<(), TableError> {
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);

    // Always write header, even with zero rows
    csv_writer
        .write_record(table.columns())
        .map_err(|e| TableError::Io(format!("CSV write error: {}", e)))?;

    for row in table.rows() {
        csv_writer
            .write_record(row.cells().iter().map(Value::to_text))
            .map_err(|e| TableError::Io(format!("CSV write error: {}", e)))?;
    }

    csv_writer
        .flush()
        .map_err(|e| TableError::Io(format!("CSV flush error: {}", e)))
}

/// Write a table as CSV to a file, or stdout when `out` is `None`.
/// Returns the output label for progress messages.
pub fn export(table: &Table, out: &Option<PathBuf>) -> Result<String, TableError> {
    let out_label = out
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "stdout".to_string());

    let writer: Box<dyn Write> = match out {
        Some(path) => {
            let f = std::fs::File::create(path).map_err(|e| {
                TableError::Io(format!("cannot create {}: {}", path.display(), e))
            })?;
            Box::new(std::io::BufWriter::new(f))
        }
        None => Box::new(std::io::BufWriter::new(std::io::stdout().lock())),
    };

    export_to_writer(table, writer, b',')?;
    Ok(out_label)
}

/// Render a table to a CSV string.
pub fn to_csv_string(table: &Table) -> Result<String, TableError> {
    let mut buf = Vec::new();
    export_to_writer(table, &mut buf, b',')?;
    String::from_utf8(buf).map_err(|e| TableError::Io(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter("a,b,c\n1,2,3\n"), b',');
        assert_eq!(sniff_delimiter("a\tb\tc\n1\t2\t3\n"), b'\t');
        assert_eq!(sniff_delimiter("a;b\n1;2\n"), b';');
        assert_eq!(sniff_delimiter(""), b',');
    }

    #[test]
    fn test_import_keeps_text_and_pads() {
        let t = import_from_str("ID,street,zipcode\n1,4600 Silver Hill Rd,20233\n2,,\n", b',').unwrap();
        assert_eq!(t.columns(), ["ID", "street", "zipcode"]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.get(0, "zipcode"), Some(&Value::text("20233")));
        assert_eq!(t.get(1, "street"), Some(&Value::Empty));
    }

    #[test]
    fn test_import_skips_blank_lines() {
        let t = import_from_str("ID,GEOID\n1,420912048003\n,\n2,420912048004\n", b',').unwrap();
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_decode_bytes_windows_1252_fallback() {
        // 0xE9 is 'é' in Windows-1252 and invalid as a lone UTF-8 byte
        let s = decode_bytes(vec![b'C', b'a', b'f', 0xE9]);
        assert_eq!(s, "Café");
    }

    #[test]
    fn test_export_writes_header_for_empty_table() {
        let t = Table::new(["ID", "status", "result"]);
        assert_eq!(to_csv_string(&t).unwrap(), "ID,status,result\n");
    }

    #[test]
    fn test_export_to_file_and_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        let mut t = Table::new(["ID", "B01001_001E", "note"]);
        t.push_row(vec!["7".into(), Value::Number(1523.0), "has, comma".into()]);
        let label = export(&t, &Some(path.clone())).unwrap();
        assert_eq!(label, path.display().to_string());

        let back = import(&path).unwrap();
        assert_eq!(back.get(0, "B01001_001E"), Some(&Value::text("1523")));
        assert_eq!(back.get(0, "note"), Some(&Value::text("has, comma")));
    }
}
