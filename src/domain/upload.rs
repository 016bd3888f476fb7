//! Validation of uploaded long-format market tables.
//!
//! An upload is a CSV with at least the columns `date, symbol, price, return,
//! volume`, one row per (date, symbol). Other file types are rejected.

use crate::domain::error::CausalError;
use crate::domain::panel::Panel;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const REQUIRED_COLUMNS: [&str; 5] = ["date", "symbol", "price", "return", "volume"];

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadRecord {
    pub date: String,
    pub symbol: String,
    pub price: f64,
    #[serde(rename = "return")]
    pub ret: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadRow {
    pub date: NaiveDate,
    pub symbol: String,
    pub price: f64,
    pub ret: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadedTable {
    pub rows: Vec<UploadRow>,
}

/// Read and validate an uploaded file.
pub fn load_upload(path: &Path) -> Result<UploadedTable, CausalError> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    if !is_csv {
        return Err(CausalError::UnsupportedFormat {
            path: path.display().to_string(),
        });
    }
    let file = File::open(path)?;
    parse_upload(file, &path.display().to_string())
}

/// Validate CSV content; `name` labels errors.
pub fn parse_upload<R: Read>(reader: R, name: &str) -> Result<UploadedTable, CausalError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = rdr.headers()?.clone();
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|required| !headers.iter().any(|h| h == **required))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(CausalError::SchemaValidation { missing });
    }

    let mut rows = Vec::new();
    for (line, result) in rdr.deserialize::<UploadRecord>().enumerate() {
        let record = result.map_err(|e| CausalError::MalformedData {
            series: name.to_string(),
            reason: format!("row {}: {e}", line + 1),
        })?;
        let date = NaiveDate::parse_from_str(&record.date, "%Y-%m-%d").map_err(|e| {
            CausalError::MalformedData {
                series: name.to_string(),
                reason: format!("row {}: invalid date {:?}: {e}", line + 1, record.date),
            }
        })?;
        rows.push(UploadRow {
            date,
            symbol: record.symbol,
            price: record.price,
            ret: record.ret,
            volume: record.volume,
        });
    }

    if rows.is_empty() {
        return Err(CausalError::NoData {
            series: name.to_string(),
        });
    }
    tracing::info!(upload = name, rows = rows.len(), "validated upload");
    Ok(UploadedTable { rows })
}

impl UploadedTable {
    pub fn symbols(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|r| r.symbol.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Wide price panel, one column per symbol in sorted order.
    pub fn price_panel(&self) -> Result<Panel, CausalError> {
        self.pivot(|row| row.price)
    }

    fn pivot(&self, value: impl Fn(&UploadRow) -> f64) -> Result<Panel, CausalError> {
        let mut by_symbol: BTreeMap<&str, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
        for row in &self.rows {
            let cells = by_symbol.entry(row.symbol.as_str()).or_default();
            if cells.insert(row.date, value(row)).is_some() {
                return Err(CausalError::MalformedData {
                    series: row.symbol.clone(),
                    reason: format!("duplicate row for {}", row.date),
                });
            }
        }

        let index: Vec<NaiveDate> = self
            .rows
            .iter()
            .map(|r| r.date)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let columns = by_symbol.keys().map(|s| s.to_string()).collect();
        let data = by_symbol
            .values()
            .map(|cells| index.iter().map(|d| cells.get(d).copied()).collect())
            .collect();
        Panel::new(index, columns, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const VALID: &str = "\
date,symbol,price,return,volume
2024-01-02,AAA,100.0,0.0,1000
2024-01-02,BBB,50.0,0.0,500
2024-01-03,AAA,101.0,0.00995,1100
";

    #[test]
    fn parses_valid_upload() {
        let table = parse_upload(VALID.as_bytes(), "valid.csv").unwrap();
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.symbols(), vec!["AAA".to_string(), "BBB".to_string()]);
        assert_eq!(table.rows[2].ret, 0.00995);
    }

    #[test]
    fn pivot_leaves_gaps_missing() {
        let table = parse_upload(VALID.as_bytes(), "valid.csv").unwrap();
        let prices = table.price_panel().unwrap();
        assert_eq!(prices.columns(), &["AAA", "BBB"]);
        assert_eq!(prices.column("AAA").unwrap(), &[Some(100.0), Some(101.0)]);
        assert_eq!(prices.column("BBB").unwrap(), &[Some(50.0), None]);
    }

    #[test]
    fn missing_columns_are_listed() {
        let csv = "date,symbol,price\n2024-01-02,AAA,1.0\n";
        let err = parse_upload(csv.as_bytes(), "thin.csv").unwrap_err();
        match err {
            CausalError::SchemaValidation { missing } => {
                assert_eq!(missing, vec!["return".to_string(), "volume".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn parquet_is_unsupported() {
        let err = load_upload(Path::new("prices.parquet")).unwrap_err();
        assert!(matches!(err, CausalError::UnsupportedFormat { .. }));
    }

    #[test]
    fn loads_csv_from_disk() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(VALID.as_bytes()).unwrap();
        let table = load_upload(file.path()).unwrap();
        assert_eq!(table.rows.len(), 3);
    }

    #[test]
    fn bad_date_is_malformed() {
        let csv = "date,symbol,price,return,volume\n02/01/2024,AAA,1.0,0.0,1\n";
        assert!(matches!(
            parse_upload(csv.as_bytes(), "bad.csv"),
            Err(CausalError::MalformedData { .. })
        ));
    }

    #[test]
    fn duplicate_rows_fail_to_pivot() {
        let csv = "date,symbol,price,return,volume\n2024-01-02,AAA,1.0,0.0,1\n2024-01-02,AAA,2.0,0.0,1\n";
        let table = parse_upload(csv.as_bytes(), "dup.csv").unwrap();
        assert!(table.price_panel().is_err());
    }
}
