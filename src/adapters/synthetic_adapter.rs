//! Offline data source backed by the seeded sample generator.

use crate::domain::error::CausalError;
use crate::domain::panel::Panel;
use crate::domain::sample::{generate_sample, SampleSpec};
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;

const START_PRICE: f64 = 100.0;

/// Serves `asset_*` prices (compounded from 100) and the sample's indicator
/// columns. The sample is generated once at construction.
pub struct SyntheticDataAdapter {
    sample: Panel,
}

impl SyntheticDataAdapter {
    pub fn new(spec: &SampleSpec) -> Result<Self, CausalError> {
        Ok(Self {
            sample: generate_sample(spec)?,
        })
    }

    pub fn sample(&self) -> &Panel {
        &self.sample
    }

    fn in_range(
        &self,
        panel: Panel,
        series: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Panel, CausalError> {
        let dates: Vec<NaiveDate> = panel
            .index()
            .iter()
            .copied()
            .filter(|d| *d >= start_date && *d <= end_date)
            .collect();
        if dates.is_empty() {
            return Err(CausalError::NoData {
                series: series.to_string(),
            });
        }
        panel.restrict_to(&dates)
    }

    fn column(&self, name: &str) -> Result<Vec<f64>, CausalError> {
        if self.sample.column_position(name).is_none() {
            return Err(CausalError::NoData {
                series: name.to_string(),
            });
        }
        self.sample.dense_column(name)
    }
}

impl DataPort for SyntheticDataAdapter {
    fn fetch_prices(
        &self,
        tickers: &[String],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Panel, CausalError> {
        let prices = tickers
            .iter()
            .map(|ticker| {
                let mut level = START_PRICE;
                self.column(ticker).map(|returns| {
                    returns
                        .into_iter()
                        .map(|r| {
                            level *= r.exp();
                            level
                        })
                        .collect::<Vec<f64>>()
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let panel = Panel::from_values(self.sample.index().to_vec(), tickers.to_vec(), prices)?;
        self.in_range(panel, "prices", start_date, end_date)
    }

    fn fetch_indicator(
        &self,
        name: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Panel, CausalError> {
        let values = self.column(name)?;
        let panel = Panel::from_values(self.sample.index().to_vec(), vec![name.to_string()], vec![values])?;
        self.in_range(panel, name, start_date, end_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::returns::log_returns;
    use approx::assert_relative_eq;

    fn adapter() -> SyntheticDataAdapter {
        SyntheticDataAdapter::new(&SampleSpec::new(NaiveDate::from_ymd_opt(2024, 6, 28).unwrap())).unwrap()
    }

    fn whole_range() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
        )
    }

    #[test]
    fn prices_reproduce_sample_returns() {
        let adapter = adapter();
        let (start, end) = whole_range();
        let prices = adapter
            .fetch_prices(&["asset_1".into(), "asset_2".into()], start, end)
            .unwrap();
        let returns = log_returns(&prices).unwrap();

        let sample = adapter.sample().dense_column("asset_1").unwrap();
        let recovered = returns.dense_column("asset_1").unwrap();
        assert_eq!(recovered.len(), sample.len() - 1);
        for (got, want) in recovered.iter().zip(&sample[1..]) {
            assert_relative_eq!(*got, *want, epsilon = 1e-9);
        }
    }

    #[test]
    fn indicator_is_single_column_in_range() {
        let adapter = adapter();
        let start = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let panel = adapter.fetch_indicator("fed_rate", start, end).unwrap();
        assert_eq!(panel.columns(), &["fed_rate"]);
        assert!(panel.index().iter().all(|d| *d >= start && *d <= end));
        assert_eq!(panel.len(), 20);
    }

    #[test]
    fn unknown_series_is_no_data() {
        let adapter = adapter();
        let (start, end) = whole_range();
        assert!(matches!(
            adapter.fetch_indicator("oil", start, end),
            Err(CausalError::NoData { .. })
        ));
        assert!(matches!(
            adapter.fetch_prices(&["asset_9".into()], start, end),
            Err(CausalError::NoData { .. })
        ));
    }

    #[test]
    fn empty_range_is_no_data() {
        let adapter = adapter();
        let start = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(1990, 12, 31).unwrap();
        assert!(matches!(
            adapter.fetch_indicator("fed_rate", start, end),
            Err(CausalError::NoData { .. })
        ));
    }
}
