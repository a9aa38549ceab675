//! ESRI shapefile decoding (`.shp` geometry + `.dbf` attributes) into a
//! [`Table`] with a WKT `geometry` column.
//!
//! Only the XY part of Z/M shapes is kept. Multipatch is not supported.

use std::fmt::Write as _;
use std::io::{Cursor, Read, Seek};

use acstools_table::{Table, Value};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};

pub const GEOMETRY_COLUMN: &str = "geometry";

const SHP_FILE_CODE: i32 = 9994;
const SHP_VERSION: i32 = 1000;
const SHP_HEADER_LEN: usize = 100;
const DBF_FIELD_TERMINATOR: u8 = 0x0D;
const DBF_EOF: u8 = 0x1A;

pub type Point = (f64, f64);
pub type Ring = Vec<Point>;

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Null,
    Point(Point),
    MultiPoint(Vec<Point>),
    LineString(Vec<Point>),
    MultiLineString(Vec<Vec<Point>>),
    /// Outer ring first, then holes
    Polygon(Vec<Ring>),
    MultiPolygon(Vec<Vec<Ring>>),
}

impl Geometry {
    /// Well-Known Text; `None` for a null shape.
    pub fn to_wkt(&self) -> Option<String> {
        let mut out = String::new();
        match self {
            Geometry::Null => return None,
            Geometry::Point(p) => {
                out.push_str("POINT (");
                write_point(&mut out, p);
                out.push(')');
            }
            Geometry::MultiPoint(points) => {
                out.push_str("MULTIPOINT (");
                for (i, p) in points.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push('(');
                    write_point(&mut out, p);
                    out.push(')');
                }
                out.push(')');
            }
            Geometry::LineString(points) => {
                out.push_str("LINESTRING ");
                write_path(&mut out, points);
            }
            Geometry::MultiLineString(lines) => {
                out.push_str("MULTILINESTRING ");
                write_paths(&mut out, lines);
            }
            Geometry::Polygon(rings) => {
                out.push_str("POLYGON ");
                write_paths(&mut out, rings);
            }
            Geometry::MultiPolygon(polygons) => {
                out.push_str("MULTIPOLYGON (");
                for (i, rings) in polygons.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    write_paths(&mut out, rings);
                }
                out.push(')');
            }
        }
        Some(out)
    }
}

fn write_point(out: &mut String, p: &Point) {
    let _ = write!(out, "{} {}", p.0, p.1);
}

fn write_path(out: &mut String, points: &[Point]) {
    out.push('(');
    for (i, p) in points.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_point(out, p);
    }
    out.push(')');
}

fn write_paths(out: &mut String, paths: &[Vec<Point>]) {
    out.push('(');
    for (i, path) in paths.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_path(out, path);
    }
    out.push(')');
}

// ============================================================================
// .shp
// ============================================================================

fn truncated(what: &str) -> impl Fn(std::io::Error) -> String + '_ {
    move |e| format!("truncated {}: {}", what, e)
}

/// Decode every record of a `.shp` file, in file order.
pub fn read_shp(bytes: &[u8]) -> Result<Vec<Geometry>, String> {
    if bytes.len() < SHP_HEADER_LEN {
        return Err("shp file shorter than its 100-byte header".to_string());
    }

    let mut cursor = Cursor::new(bytes);
    let file_code = cursor.read_i32::<BigEndian>().map_err(truncated("shp header"))?;
    if file_code != SHP_FILE_CODE {
        return Err(format!("not a shapefile (file code {})", file_code));
    }
    cursor.set_position(24);
    let file_len_words = cursor.read_i32::<BigEndian>().map_err(truncated("shp header"))?;
    let version = cursor.read_i32::<LittleEndian>().map_err(truncated("shp header"))?;
    if version != SHP_VERSION {
        return Err(format!("unsupported shapefile version {}", version));
    }

    let declared_len = (file_len_words.max(0) as usize).saturating_mul(2);
    let end = if declared_len >= SHP_HEADER_LEN {
        declared_len.min(bytes.len())
    } else {
        bytes.len()
    };

    let mut geometries = Vec::new();
    let mut pos = SHP_HEADER_LEN;
    while pos + 8 <= end {
        cursor.set_position(pos as u64);
        let _record_number = cursor.read_i32::<BigEndian>().map_err(truncated("record header"))?;
        let content_words = cursor.read_i32::<BigEndian>().map_err(truncated("record header"))?;
        let content_len = (content_words.max(0) as usize) * 2;
        let start = pos + 8;
        let stop = start + content_len;
        if stop > bytes.len() {
            return Err(format!("record {} runs past end of file", geometries.len() + 1));
        }
        let geometry = read_shape(&bytes[start..stop])
            .map_err(|e| format!("record {}: {}", geometries.len() + 1, e))?;
        geometries.push(geometry);
        pos = stop;
    }

    Ok(geometries)
}

fn read_shape(content: &[u8]) -> Result<Geometry, String> {
    let mut c = Cursor::new(content);
    let shape_type = c.read_i32::<LittleEndian>().map_err(truncated("shape type"))?;

    match shape_type {
        0 => Ok(Geometry::Null),
        1 | 11 | 21 => Ok(Geometry::Point(read_point(&mut c)?)),
        8 | 18 | 28 => {
            skip_bbox(&mut c)?;
            let n = read_count(&mut c, "point count")?;
            let points = (0..n).map(|_| read_point(&mut c)).collect::<Result<Vec<_>, _>>()?;
            Ok(Geometry::MultiPoint(points))
        }
        3 | 13 | 23 => {
            let mut parts = read_parts(&mut c)?;
            if parts.len() == 1 {
                Ok(Geometry::LineString(parts.remove(0)))
            } else {
                Ok(Geometry::MultiLineString(parts))
            }
        }
        5 | 15 | 25 => {
            let rings = read_parts(&mut c)?;
            Ok(assemble_polygons(rings))
        }
        other => Err(format!("unsupported shape type {}", other)),
    }
}

fn read_point<R: Read>(c: &mut R) -> Result<Point, String> {
    let x = c.read_f64::<LittleEndian>().map_err(truncated("point"))?;
    let y = c.read_f64::<LittleEndian>().map_err(truncated("point"))?;
    Ok((x, y))
}

fn skip_bbox<R: Read + Seek>(c: &mut R) -> Result<(), String> {
    c.seek(std::io::SeekFrom::Current(32))
        .map(|_| ())
        .map_err(truncated("bounding box"))
}

fn read_count<R: Read>(c: &mut R, what: &str) -> Result<usize, String> {
    let n = c.read_i32::<LittleEndian>().map_err(truncated(what))?;
    usize::try_from(n).map_err(|_| format!("negative {}", what))
}

/// Parts of a PolyLine/Polygon record as point lists.
fn read_parts(c: &mut Cursor<&[u8]>) -> Result<Vec<Vec<Point>>, String> {
    skip_bbox(c)?;
    let num_parts = read_count(c, "part count")?;
    let num_points = read_count(c, "point count")?;

    let mut starts = Vec::new();
    for _ in 0..num_parts {
        starts.push(read_count(c, "part index")?);
    }
    let points = (0..num_points).map(|_| read_point(c)).collect::<Result<Vec<_>, _>>()?;

    let mut parts = Vec::with_capacity(starts.len());
    for (i, &start) in starts.iter().enumerate() {
        let stop = starts.get(i + 1).copied().unwrap_or(num_points);
        if start > stop || stop > num_points {
            return Err(format!("part {} has invalid point range {}..{}", i, start, stop));
        }
        parts.push(points[start..stop].to_vec());
    }
    Ok(parts)
}

/// Twice the signed area; negative for clockwise rings.
fn signed_area2(ring: &[Point]) -> f64 {
    ring.windows(2)
        .map(|w| w[0].0 * w[1].1 - w[1].0 * w[0].1)
        .sum()
}

/// Ray-casting point-in-ring test.
fn ring_contains(ring: &[Point], p: Point) -> bool {
    let mut inside = false;
    let mut j = ring.len().wrapping_sub(1);
    for i in 0..ring.len() {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];
        if (yi > p.1) != (yj > p.1) && p.0 < (xj - xi) * (p.1 - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Shapefile polygons store outer rings clockwise and holes
/// counter-clockwise. Each hole joins the outer ring containing it,
/// falling back to the last outer ring.
fn assemble_polygons(rings: Vec<Ring>) -> Geometry {
    let mut polygons: Vec<Vec<Ring>> = Vec::new();
    let mut holes: Vec<Ring> = Vec::new();

    for ring in rings {
        if signed_area2(&ring) <= 0.0 {
            polygons.push(vec![ring]);
        } else {
            holes.push(ring);
        }
    }

    if polygons.is_empty() {
        // No clockwise ring: treat every ring as its own polygon
        polygons = holes.into_iter().map(|ring| vec![ring]).collect();
    } else {
        for hole in holes {
            let probe = hole.first().copied().unwrap_or((0.0, 0.0));
            let owner = polygons
                .iter()
                .position(|poly| ring_contains(&poly[0], probe))
                .unwrap_or(polygons.len() - 1);
            polygons[owner].push(hole);
        }
    }

    match polygons.len() {
        0 => Geometry::Null,
        1 => Geometry::Polygon(polygons.remove(0)),
        _ => Geometry::MultiPolygon(polygons),
    }
}

// ============================================================================
// .dbf
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct DbfField {
    pub name: String,
    pub kind: char,
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DbfTable {
    pub fields: Vec<DbfField>,
    /// One entry per stored record; `None` marks a deleted record
    pub records: Vec<Option<Vec<Value>>>,
}

/// Decode a dBase III `.dbf` file.
pub fn read_dbf(bytes: &[u8]) -> Result<DbfTable, String> {
    if bytes.len() < 32 {
        return Err("dbf file shorter than its 32-byte header".to_string());
    }

    let mut c = Cursor::new(bytes);
    c.set_position(4);
    let num_records = c.read_u32::<LittleEndian>().map_err(truncated("dbf header"))? as usize;
    let header_len = c.read_u16::<LittleEndian>().map_err(truncated("dbf header"))? as usize;
    let record_len = c.read_u16::<LittleEndian>().map_err(truncated("dbf header"))? as usize;

    let mut fields = Vec::new();
    let mut pos = 32;
    while pos < bytes.len() && bytes[pos] != DBF_FIELD_TERMINATOR {
        if pos + 32 > bytes.len() {
            return Err("truncated dbf field descriptor".to_string());
        }
        let desc = &bytes[pos..pos + 32];
        let name_end = desc[..11].iter().position(|&b| b == 0).unwrap_or(11);
        fields.push(DbfField {
            name: decode_text(&desc[..name_end]).trim().to_string(),
            kind: desc[11] as char,
            length: desc[16] as usize,
        });
        pos += 32;
    }

    let field_total: usize = fields.iter().map(|f| f.length).sum();
    if record_len < field_total + 1 {
        return Err(format!(
            "dbf record length {} is smaller than its fields ({})",
            record_len,
            field_total + 1
        ));
    }

    let mut records = Vec::with_capacity(num_records.min(bytes.len()));
    for i in 0..num_records {
        let start = header_len + i * record_len;
        if start < bytes.len() && bytes[start] == DBF_EOF {
            break;
        }
        let end = start + record_len;
        if end > bytes.len() {
            return Err(format!("dbf record {} runs past end of file", i + 1));
        }
        let record = &bytes[start..end];
        if record[0] == b'*' {
            records.push(None);
            continue;
        }

        let mut offset = 1;
        let mut values = Vec::with_capacity(fields.len());
        for field in &fields {
            let raw = &record[offset..offset + field.length];
            values.push(decode_field(field.kind, raw));
            offset += field.length;
        }
        records.push(Some(values));
    }

    Ok(DbfTable { fields, records })
}

/// UTF-8 with Windows-1252 fallback.
fn decode_text(raw: &[u8]) -> String {
    match std::str::from_utf8(raw) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(raw);
            decoded.into_owned()
        }
    }
}

fn decode_field(kind: char, raw: &[u8]) -> Value {
    let text = decode_text(raw);
    let text = text.trim_matches(|c: char| c == ' ' || c == '\0');
    if text.is_empty() {
        return Value::Empty;
    }

    match kind.to_ascii_uppercase() {
        'N' | 'F' => match text.parse::<f64>() {
            Ok(n) => Value::Number(n),
            Err(_) if text.starts_with('*') => Value::Empty,
            Err(_) => Value::text(text),
        },
        'L' => match text.chars().next() {
            Some('T' | 't' | 'Y' | 'y') => Value::Boolean(true),
            Some('F' | 'f' | 'N' | 'n') => Value::Boolean(false),
            _ => Value::Empty,
        },
        _ => Value::text(text),
    }
}

// ============================================================================
// Pairing
// ============================================================================

/// Combine decoded `.shp` and `.dbf` contents into one table. Deleted
/// attribute records drop their geometry as well.
pub fn to_table(geometries: Vec<Geometry>, dbf: DbfTable) -> Result<Table, String> {
    if geometries.len() != dbf.records.len() {
        return Err(format!(
            "shp has {} records but dbf has {}",
            geometries.len(),
            dbf.records.len()
        ));
    }

    let mut columns: Vec<String> = dbf.fields.iter().map(|f| f.name.clone()).collect();
    columns.push(GEOMETRY_COLUMN.to_string());
    let mut table = Table::new(columns);

    for (geometry, record) in geometries.into_iter().zip(dbf.records) {
        let Some(mut values) = record else { continue };
        values.push(geometry.to_wkt().map(Value::Text).unwrap_or_default());
        table.push_row(values);
    }

    Ok(table)
}

/// Decode every `.shp`/`.dbf` pair found in a zip archive.
pub fn read_zip(bytes: &[u8]) -> Result<Table, String> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("invalid zip archive: {}", e))?;

    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    let shp_names: Vec<&String> = names
        .iter()
        .filter(|n| n.to_ascii_lowercase().ends_with(".shp"))
        .collect();
    if shp_names.is_empty() {
        return Err("archive contains no .shp file".to_string());
    }

    let mut tables = Vec::with_capacity(shp_names.len());
    for shp_name in shp_names {
        let stem = &shp_name[..shp_name.len() - 4];
        let dbf_name = names
            .iter()
            .find(|n| {
                n.len() == shp_name.len()
                    && n.get(..stem.len()) == Some(stem)
                    && n.to_ascii_lowercase().ends_with(".dbf")
            })
            .ok_or_else(|| format!("{} has no matching .dbf", shp_name))?;

        let shp = read_entry(&mut archive, shp_name)?;
        let dbf = read_entry(&mut archive, dbf_name)?;
        let table = to_table(read_shp(&shp)?, read_dbf(&dbf)?)
            .map_err(|e| format!("{}: {}", shp_name, e))?;
        tables.push(table);
    }

    Ok(Table::concat(tables))
}

fn read_entry<R: Read + Seek>(archive: &mut zip::ZipArchive<R>, name: &str) -> Result<Vec<u8>, String> {
    let mut file = archive
        .by_name(name)
        .map_err(|e| format!("cannot open {} in archive: {}", name, e))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .map_err(|e| format!("cannot read {} in archive: {}", name, e))?;
    Ok(buf)
}

// ============================================================================
// Fixtures for tests
// ============================================================================

#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::Write;

    use byteorder::{BigEndian, LittleEndian, WriteBytesExt};

    /// `.shp` bytes holding one Point record per input point.
    pub fn points_shp(points: &[(f64, f64)]) -> Vec<u8> {
        let records: Vec<Vec<u8>> = points
            .iter()
            .map(|&(x, y)| {
                let mut content = Vec::new();
                content.write_i32::<LittleEndian>(1).unwrap();
                content.write_f64::<LittleEndian>(x).unwrap();
                content.write_f64::<LittleEndian>(y).unwrap();
                content
            })
            .collect();
        shp(1, &records)
    }

    /// `.shp` bytes from raw record contents.
    pub fn shp(shape_type: i32, records: &[Vec<u8>]) -> Vec<u8> {
        let body_len: usize = records.iter().map(|r| r.len() + 8).sum();
        let mut out = Vec::new();
        out.write_i32::<BigEndian>(9994).unwrap();
        out.extend_from_slice(&[0u8; 20]);
        out.write_i32::<BigEndian>(((100 + body_len) / 2) as i32).unwrap();
        out.write_i32::<LittleEndian>(1000).unwrap();
        out.write_i32::<LittleEndian>(shape_type).unwrap();
        out.extend_from_slice(&[0u8; 64]);
        for (i, content) in records.iter().enumerate() {
            out.write_i32::<BigEndian>(i as i32 + 1).unwrap();
            out.write_i32::<BigEndian>((content.len() / 2) as i32).unwrap();
            out.extend_from_slice(content);
        }
        out
    }

    /// Polygon record content from rings.
    pub fn polygon_record(rings: &[Vec<(f64, f64)>]) -> Vec<u8> {
        let num_points: usize = rings.iter().map(|r| r.len()).sum();
        let mut c = Vec::new();
        c.write_i32::<LittleEndian>(5).unwrap();
        for _ in 0..4 {
            c.write_f64::<LittleEndian>(0.0).unwrap();
        }
        c.write_i32::<LittleEndian>(rings.len() as i32).unwrap();
        c.write_i32::<LittleEndian>(num_points as i32).unwrap();
        let mut start = 0;
        for ring in rings {
            c.write_i32::<LittleEndian>(start as i32).unwrap();
            start += ring.len();
        }
        for ring in rings {
            for &(x, y) in ring {
                c.write_f64::<LittleEndian>(x).unwrap();
                c.write_f64::<LittleEndian>(y).unwrap();
            }
        }
        c
    }

    /// `.dbf` bytes. `fields` are (name, type, length); records flagged
    /// `true` are written as deleted.
    pub fn dbf(fields: &[(&str, char, u8)], records: &[(bool, Vec<&str>)]) -> Vec<u8> {
        let record_len: usize = 1 + fields.iter().map(|f| f.2 as usize).sum::<usize>();
        let header_len = 32 + fields.len() * 32 + 1;
        let mut out = Vec::new();
        out.push(0x03);
        out.extend_from_slice(&[124, 1, 1]);
        out.write_u32::<LittleEndian>(records.len() as u32).unwrap();
        out.write_u16::<LittleEndian>(header_len as u16).unwrap();
        out.write_u16::<LittleEndian>(record_len as u16).unwrap();
        out.extend_from_slice(&[0u8; 20]);
        for (name, kind, len) in fields {
            let mut desc = [0u8; 32];
            desc[..name.len()].copy_from_slice(name.as_bytes());
            desc[11] = *kind as u8;
            desc[16] = *len;
            out.extend_from_slice(&desc);
        }
        out.push(0x0D);
        for (deleted, values) in records {
            out.push(if *deleted { b'*' } else { b' ' });
            for ((_, _, len), value) in fields.iter().zip(values) {
                let mut cell = value.as_bytes().to_vec();
                cell.resize(*len as usize, b' ');
                out.extend_from_slice(&cell);
            }
        }
        out.push(0x1A);
        out
    }

    /// Zip archive with the given (name, bytes) entries.
    pub fn zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, bytes) in entries {
            writer
                .start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    /// Zip holding a point layer with `n` records and a GEOID attribute.
    pub fn point_layer_zip(stem: &str, n: usize) -> Vec<u8> {
        let points: Vec<(f64, f64)> = (0..n).map(|i| (-75.0 - i as f64, 40.0)).collect();
        let geoids: Vec<String> = (0..n).map(|i| format!("42{:03}", i)).collect();
        let records: Vec<(bool, Vec<&str>)> = geoids.iter().map(|g| (false, vec![g.as_str()])).collect();
        let shp = points_shp(&points);
        let dbf = dbf(&[("GEOID", 'C', 5)], &records);
        let shp_name = format!("{}.shp", stem);
        let dbf_name = format!("{}.dbf", stem);
        zip(&[
            (shp_name.as_str(), shp.as_slice()),
            (dbf_name.as_str(), dbf.as_slice()),
        ])
    }
}
