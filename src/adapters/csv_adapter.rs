//! CSV file data adapter.
//!
//! Each series lives in `<base_path>/<NAME>.csv` with a `date` column
//! (`YYYY-MM-DD`) and a `value` or `close` column. Blank cells and `.` mark
//! missing observations and are skipped.

use crate::domain::error::CausalError;
use crate::domain::panel::Panel;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

const VALUE_COLUMNS: [&str; 2] = ["value", "close"];

pub struct CsvDataAdapter {
    base_path: PathBuf,
}

impl CsvDataAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, name: &str) -> PathBuf {
        self.base_path.join(format!("{name}.csv"))
    }

    /// Observations of one series within `[start_date, end_date]`, sorted by date.
    fn read_series(
        &self,
        name: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, f64>, CausalError> {
        let path = self.csv_path(name);
        let content = fs::read_to_string(&path).map_err(|e| CausalError::DataSource {
            series: name.to_string(),
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let malformed = |reason: String| CausalError::MalformedData {
            series: name.to_string(),
            reason,
        };

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| malformed(format!("CSV header error: {e}")))?
            .clone();
        let find = |wanted: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(wanted));
        let date_col = find("date").ok_or_else(|| malformed("missing date column".into()))?;
        let value_col = VALUE_COLUMNS
            .iter()
            .find_map(|c| find(*c))
            .ok_or_else(|| malformed("missing value or close column".into()))?;

        let mut observations = BTreeMap::new();
        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| malformed(format!("CSV parse error: {e}")))?;

            let date_str = record.get(date_col).unwrap_or_default();
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
                .map_err(|e| malformed(format!("row {}: invalid date {date_str:?}: {e}", line + 1)))?;
            if date < start_date || date > end_date {
                continue;
            }

            let raw = record.get(value_col).unwrap_or_default();
            if raw.is_empty() || raw == "." {
                continue;
            }
            let value: f64 = raw
                .parse()
                .map_err(|e| malformed(format!("row {}: invalid value {raw:?}: {e}", line + 1)))?;
            if observations.insert(date, value).is_some() {
                return Err(malformed(format!("duplicate date {date}")));
            }
        }

        if observations.is_empty() {
            return Err(CausalError::NoData {
                series: name.to_string(),
            });
        }
        tracing::debug!(series = name, rows = observations.len(), "read csv series");
        Ok(observations)
    }
}

impl DataPort for CsvDataAdapter {
    fn fetch_prices(
        &self,
        tickers: &[String],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Panel, CausalError> {
        if tickers.is_empty() {
            return Err(CausalError::NoData {
                series: "prices".to_string(),
            });
        }
        let series = tickers
            .iter()
            .map(|t| self.read_series(t, start_date, end_date))
            .collect::<Result<Vec<_>, _>>()?;

        let index: Vec<NaiveDate> = series
            .iter()
            .flat_map(|s| s.keys().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let data = series
            .iter()
            .map(|s| index.iter().map(|d| s.get(d).copied()).collect())
            .collect();
        Panel::new(index, tickers.to_vec(), data)
    }

    fn fetch_indicator(
        &self,
        name: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Panel, CausalError> {
        let observations = self.read_series(name, start_date, end_date)?;
        Panel::from_observations(name, observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_csv(dir: &TempDir, name: &str, content: &str) {
        let mut file = fs::File::create(dir.path().join(format!("{name}.csv"))).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn fetch_prices_unions_dates() {
        let dir = TempDir::new().unwrap();
        write_csv(&dir, "SPY", "date,close\n2024-01-02,470.0\n2024-01-03,468.5\n");
        write_csv(&dir, "QQQ", "Date,Close\n2024-01-03,400.0\n2024-01-04,401.0\n");
        let adapter = CsvDataAdapter::new(dir.path().to_path_buf());

        let panel = adapter
            .fetch_prices(&["SPY".into(), "QQQ".into()], d(2024, 1, 1), d(2024, 12, 31))
            .unwrap();
        assert_eq!(panel.index(), &[d(2024, 1, 2), d(2024, 1, 3), d(2024, 1, 4)]);
        assert_eq!(panel.column("SPY").unwrap(), &[Some(470.0), Some(468.5), None]);
        assert_eq!(panel.column("QQQ").unwrap(), &[None, Some(400.0), Some(401.0)]);
    }

    #[test]
    fn fetch_indicator_filters_range_and_skips_missing() {
        let dir = TempDir::new().unwrap();
        write_csv(
            &dir,
            "FEDFUNDS",
            "date,value\n2023-12-01,5.33\n2024-01-01,5.33\n2024-02-01,.\n2024-03-01,5.31\n",
        );
        let adapter = CsvDataAdapter::new(dir.path().to_path_buf());

        let panel = adapter
            .fetch_indicator("FEDFUNDS", d(2024, 1, 1), d(2024, 12, 31))
            .unwrap();
        assert_eq!(panel.columns(), &["FEDFUNDS"]);
        assert_eq!(panel.index(), &[d(2024, 1, 1), d(2024, 3, 1)]);
    }

    #[test]
    fn missing_file_is_data_source_error() {
        let dir = TempDir::new().unwrap();
        let adapter = CsvDataAdapter::new(dir.path().to_path_buf());
        let err = adapter
            .fetch_indicator("CPI", d(2024, 1, 1), d(2024, 12, 31))
            .unwrap_err();
        assert!(matches!(err, CausalError::DataSource { .. }));
    }

    #[test]
    fn nothing_in_range_is_no_data() {
        let dir = TempDir::new().unwrap();
        write_csv(&dir, "CPI", "date,value\n2010-01-01,1.0\n");
        let adapter = CsvDataAdapter::new(dir.path().to_path_buf());
        let err = adapter
            .fetch_indicator("CPI", d(2024, 1, 1), d(2024, 12, 31))
            .unwrap_err();
        assert!(matches!(err, CausalError::NoData { .. }));
    }

    #[test]
    fn bad_content_is_malformed() {
        let dir = TempDir::new().unwrap();
        write_csv(&dir, "NOVAL", "date,open\n2024-01-02,1.0\n");
        write_csv(&dir, "BADNUM", "date,value\n2024-01-02,abc\n");
        write_csv(&dir, "BADDATE", "date,value\n01/02/2024,1.0\n");
        let adapter = CsvDataAdapter::new(dir.path().to_path_buf());

        for name in ["NOVAL", "BADNUM", "BADDATE"] {
            let err = adapter
                .fetch_indicator(name, d(2024, 1, 1), d(2024, 12, 31))
                .unwrap_err();
            assert!(matches!(err, CausalError::MalformedData { .. }), "{name}: {err}");
        }
    }
}
