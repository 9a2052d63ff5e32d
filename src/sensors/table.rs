//! Delimited sensor tables (phone sensor-app exports)
//!
//! Columns are bound to roles through a declared [`TableSchema`] instead of by
//! position. A header is cleaned (unit suffix `"(...)"` removed, whitespace
//! trimmed) and then matched against each role's keywords, which must all
//! appear as whole words, ignoring case.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use serde::Serialize;

use crate::error::{MapperError, Result};
use crate::types::{AccelReading, AccelSeries, MagReading, MagSeries, ScalarSeries, TimeSeries};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Time,
    AccelX,
    AccelY,
    AccelZ,
    MagX,
    MagY,
    MagZ,
    FieldMagnitude,
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ColumnRole::Time => "time",
            ColumnRole::AccelX => "acceleration x",
            ColumnRole::AccelY => "acceleration y",
            ColumnRole::AccelZ => "acceleration z",
            ColumnRole::MagX => "magnetic field x",
            ColumnRole::MagY => "magnetic field y",
            ColumnRole::MagZ => "magnetic field z",
            ColumnRole::FieldMagnitude => "absolute field",
        };
        write!(f, "{}", name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSpec {
    pub role: ColumnRole,
    /// Every keyword must be a word of the cleaned header.
    pub must_contain: Vec<String>,
}

impl ColumnSpec {
    pub fn new(role: ColumnRole, keywords: &[&str]) -> Self {
        Self {
            role,
            must_contain: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    pub fn matches(&self, cleaned_header: &str) -> bool {
        let words: Vec<String> = cleaned_header
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        self.must_contain
            .iter()
            .all(|k| words.iter().any(|w| *w == k.to_lowercase()))
    }
}

/// Roles a dataset needs, in the order they are declared.
#[derive(Clone, Debug, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
}

impl TableSchema {
    pub fn new(name: &str, columns: Vec<ColumnSpec>) -> Self {
        Self {
            name: name.to_string(),
            columns,
        }
    }

    /// Gravity-free acceleration export (`Linear Acceleration x (m/s^2)`, ...).
    pub fn linear_acceleration() -> Self {
        Self::new(
            "linear acceleration",
            vec![
                ColumnSpec::new(ColumnRole::Time, &["Time"]),
                ColumnSpec::new(ColumnRole::AccelX, &["Linear", "Acceleration", "x"]),
                ColumnSpec::new(ColumnRole::AccelY, &["Linear", "Acceleration", "y"]),
            ],
        )
    }

    /// Any acceleration export, raw or linear.
    pub fn acceleration() -> Self {
        Self::new(
            "acceleration",
            vec![
                ColumnSpec::new(ColumnRole::Time, &["Time"]),
                ColumnSpec::new(ColumnRole::AccelX, &["Acceleration", "x"]),
                ColumnSpec::new(ColumnRole::AccelY, &["Acceleration", "y"]),
            ],
        )
    }

    pub fn magnetometer() -> Self {
        Self::new(
            "magnetometer",
            vec![
                ColumnSpec::new(ColumnRole::Time, &["Time"]),
                ColumnSpec::new(ColumnRole::MagX, &["field", "x"]),
                ColumnSpec::new(ColumnRole::MagY, &["field", "y"]),
                ColumnSpec::new(ColumnRole::MagZ, &["field", "z"]),
            ],
        )
    }

    pub fn absolute_field() -> Self {
        Self::new(
            "absolute field",
            vec![
                ColumnSpec::new(ColumnRole::Time, &["Time"]),
                ColumnSpec::new(ColumnRole::FieldMagnitude, &["Absolute", "field"]),
            ],
        )
    }

    /// Map every declared role to a header index.
    ///
    /// Fails with `MissingColumn` when a role matches no header, and with
    /// `InvalidInput` when it matches more than one.
    pub fn resolve(&self, headers: &[String]) -> Result<HashMap<ColumnRole, usize>> {
        let cleaned: Vec<String> = headers.iter().map(|h| clean_header(h)).collect();
        let mut indices = HashMap::new();

        for spec in &self.columns {
            let hits: Vec<usize> = cleaned
                .iter()
                .enumerate()
                .filter(|(_, h)| spec.matches(h))
                .map(|(i, _)| i)
                .collect();
            match hits.as_slice() {
                [index] => {
                    indices.insert(spec.role, *index);
                }
                [] => {
                    return Err(MapperError::MissingColumn {
                        role: spec.role.to_string(),
                        expected: spec.must_contain.clone(),
                        available: headers.to_vec(),
                    })
                }
                many => {
                    let names: Vec<&str> = many.iter().map(|&i| headers[i].as_str()).collect();
                    return Err(MapperError::InvalidInput(format!(
                        "{} column for {} is ambiguous: {:?}",
                        self.name, spec.role, names
                    )));
                }
            }
        }
        Ok(indices)
    }
}

/// `"Absolute field (µT)"` -> `"Absolute field"`.
pub fn clean_header(header: &str) -> String {
    header.split('(').next().unwrap_or_default().trim().to_string()
}

/// Numeric columns of one table, ordered by time.
#[derive(Clone, Debug)]
pub struct LoadedTable {
    pub headers: Vec<String>,
    columns: HashMap<ColumnRole, Vec<f64>>,
    pub rows_skipped: usize,
}

impl LoadedTable {
    pub fn len(&self) -> usize {
        self.columns.get(&ColumnRole::Time).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column(&self, role: ColumnRole) -> Result<&[f64]> {
        self.columns
            .get(&role)
            .map(Vec::as_slice)
            .ok_or_else(|| MapperError::MissingColumn {
                role: role.to_string(),
                expected: Vec::new(),
                available: self.headers.clone(),
            })
    }

    pub fn times(&self) -> Result<&[f64]> {
        self.column(ColumnRole::Time)
    }

    pub fn scalar_series(&self, role: ColumnRole) -> Result<ScalarSeries> {
        TimeSeries::new(self.times()?.to_vec(), self.column(role)?.to_vec())
    }

    pub fn accel_series(&self) -> Result<AccelSeries> {
        let (xs, ys) = (self.column(ColumnRole::AccelX)?, self.column(ColumnRole::AccelY)?);
        let values = xs.iter().zip(ys).map(|(&x, &y)| AccelReading { x, y }).collect();
        TimeSeries::new(self.times()?.to_vec(), values)
    }

    pub fn mag_series(&self) -> Result<MagSeries> {
        let xs = self.column(ColumnRole::MagX)?;
        let ys = self.column(ColumnRole::MagY)?;
        let zs = self.column(ColumnRole::MagZ)?;
        let values = xs
            .iter()
            .zip(ys)
            .zip(zs)
            .map(|((&x, &y), &z)| MagReading { x, y, z })
            .collect();
        TimeSeries::new(self.times()?.to_vec(), values)
    }
}

pub struct TableLoader {
    delimiter: u8,
}

impl TableLoader {
    pub fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }

    /// Load a table from disk; `.gz` files are decompressed on the fly.
    pub fn load_path(&self, path: &Path, schema: &TableSchema) -> Result<LoadedTable> {
        let file = File::open(path)?;
        let source = path.display().to_string();
        let table = if path.extension().map(|e| e == "gz").unwrap_or(false) {
            self.load_reader(BufReader::new(GzDecoder::new(file)), schema, &source)?
        } else {
            self.load_reader(BufReader::new(file), schema, &source)?
        };
        log::info!(
            "{}: {} rows as {} ({} skipped)",
            source,
            table.len(),
            schema.name,
            table.rows_skipped
        );
        Ok(table)
    }

    pub fn load_reader<R: Read>(&self, reader: R, schema: &TableSchema, source_name: &str) -> Result<LoadedTable> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .delimiter(self.delimiter)
            .from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        let indices = schema.resolve(&headers)?;
        let roles: Vec<(ColumnRole, usize)> = schema
            .columns
            .iter()
            .filter_map(|spec| indices.get(&spec.role).map(|&i| (spec.role, i)))
            .collect();
        let time_slot = roles
            .iter()
            .position(|(role, _)| *role == ColumnRole::Time)
            .ok_or_else(|| MapperError::InvalidInput(format!("schema {} has no time column", schema.name)))?;

        let mut rows: Vec<Vec<f64>> = Vec::new();
        let mut rows_skipped = 0;
        for (line, record) in rdr.records().enumerate() {
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    log::warn!("{source_name}: skipping row {} ({e})", line + 2);
                    rows_skipped += 1;
                    continue;
                }
            };
            let row: Option<Vec<f64>> = roles
                .iter()
                .map(|&(_, i)| record.get(i).and_then(|cell| cell.parse::<f64>().ok()))
                .collect();
            match row {
                Some(row) if row.iter().all(|v| v.is_finite()) => rows.push(row),
                _ => rows_skipped += 1,
            }
        }
        if rows_skipped > 0 {
            log::warn!("{source_name}: {rows_skipped} rows with unparseable cells skipped");
        }
        if rows.is_empty() {
            return Err(MapperError::EmptyParseResult {
                source_name: source_name.to_string(),
            });
        }

        rows.sort_by(|a, b| a[time_slot].total_cmp(&b[time_slot]));

        let columns = roles
            .iter()
            .enumerate()
            .map(|(slot, &(role, _))| (role, rows.iter().map(|r| r[slot]).collect()))
            .collect();

        Ok(LoadedTable {
            headers,
            columns,
            rows_skipped,
        })
    }
}

impl Default for TableLoader {
    fn default() -> Self {
        Self::new(b',')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCEL_CSV: &str = "\
\"Time (s)\",\"Linear Acceleration x (m/s^2)\",\"Linear Acceleration y (m/s^2)\",\"Linear Acceleration z (m/s^2)\"
0.02,0.1,0.2,0.3
0.00,0.0,0.0,0.0
0.01,bad,0.1,0.1
0.03,0.4,0.5,0.6
";

    #[test]
    fn test_clean_header() {
        assert_eq!(clean_header("Absolute field (µT)"), "Absolute field");
        assert_eq!(clean_header("  Time (s) "), "Time");
        assert_eq!(clean_header("S1"), "S1");
    }

    #[test]
    fn test_column_spec_matches_whole_words() {
        let spec = ColumnSpec::new(ColumnRole::AccelX, &["Acceleration", "x"]);
        assert!(spec.matches("Linear Acceleration x"));
        assert!(spec.matches("acceleration X"));
        assert!(!spec.matches("Linear Acceleration y"));
        assert!(!spec.matches("Time"));
    }

    #[test]
    fn test_load_sorts_and_skips() {
        let table = TableLoader::default()
            .load_reader(ACCEL_CSV.as_bytes(), &TableSchema::linear_acceleration(), "accel")
            .unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.rows_skipped, 1);
        assert_eq!(table.times().unwrap(), &[0.0, 0.02, 0.03]);
        let accel = table.accel_series().unwrap();
        assert_eq!(accel.values()[1], AccelReading { x: 0.1, y: 0.2 });
    }

    #[test]
    fn test_missing_column() {
        let err = TableLoader::default()
            .load_reader(ACCEL_CSV.as_bytes(), &TableSchema::magnetometer(), "accel")
            .unwrap_err();
        match err {
            MapperError::MissingColumn { role, available, .. } => {
                assert_eq!(role, "magnetic field x");
                assert_eq!(available.len(), 4);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_ambiguous_column() {
        let csv = "Time (s),Acceleration x (a),Acceleration x (b),Acceleration y\n0,1,2,3\n";
        let err = TableLoader::default()
            .load_reader(csv.as_bytes(), &TableSchema::acceleration(), "dup")
            .unwrap_err();
        assert!(matches!(err, MapperError::InvalidInput(_)));
    }

    #[test]
    fn test_absolute_field_and_semicolon_delimiter() {
        let csv = "Time (s);Magnetic field x (µT);Absolute field (µT)\n0.0;1.0;48.5\n0.5;1.1;48.7\n";
        let table = TableLoader::new(b';')
            .load_reader(csv.as_bytes(), &TableSchema::absolute_field(), "field")
            .unwrap();
        let field = table.scalar_series(ColumnRole::FieldMagnitude).unwrap();
        assert_eq!(field.values(), &[48.5, 48.7]);
    }

    #[test]
    fn test_no_rows_is_empty_parse_result() {
        let csv = "Time (s),Absolute field (µT)\n";
        let err = TableLoader::default()
            .load_reader(csv.as_bytes(), &TableSchema::absolute_field(), "empty")
            .unwrap_err();
        assert!(matches!(err, MapperError::EmptyParseResult { .. }));
    }
}
