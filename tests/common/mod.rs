#![allow(dead_code)]

use causalfolio::adapters::file_config_adapter::FileConfigAdapter;
use causalfolio::domain::config::{build_pipeline_config, PipelineConfig};
use causalfolio::domain::error::CausalError;
use causalfolio::domain::panel::Panel;
use causalfolio::domain::sample::business_days_ending;
use causalfolio::ports::data_port::DataPort;
use chrono::NaiveDate;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::collections::HashMap;

pub const RATE_MEAN: f64 = 0.02;

/// In-memory data port. Series named in `errors` fail with `DataSource`.
pub struct MockDataPort {
    pub prices: Panel,
    pub indicators: HashMap<String, Panel>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new(prices: Panel) -> Self {
        Self {
            prices,
            indicators: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_indicator(mut self, name: &str, panel: Panel) -> Self {
        self.indicators.insert(name.to_string(), panel);
        self
    }

    pub fn with_error(mut self, name: &str, reason: &str) -> Self {
        self.errors.insert(name.to_string(), reason.to_string());
        self
    }

    fn check(&self, name: &str) -> Result<(), CausalError> {
        match self.errors.get(name) {
            Some(reason) => Err(CausalError::DataSource {
                series: name.to_string(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

fn in_range(panel: &Panel, start: NaiveDate, end: NaiveDate) -> Result<Panel, CausalError> {
    let dates: Vec<NaiveDate> = panel
        .index()
        .iter()
        .copied()
        .filter(|d| *d >= start && *d <= end)
        .collect();
    panel.restrict_to(&dates)
}

impl DataPort for MockDataPort {
    fn fetch_prices(
        &self,
        tickers: &[String],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Panel, CausalError> {
        for ticker in tickers {
            self.check(ticker)?;
        }
        in_range(&self.prices.select(tickers)?, start_date, end_date)
    }

    fn fetch_indicator(
        &self,
        name: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Panel, CausalError> {
        self.check(name)?;
        let panel = self.indicators.get(name).ok_or_else(|| CausalError::NoData {
            series: name.to_string(),
        })?;
        in_range(panel, start_date, end_date)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn days(end: NaiveDate, n: usize) -> Vec<NaiveDate> {
    business_days_ending(end, n)
}

pub fn white_noise(rng: &mut ChaCha8Rng, n: usize, mean: f64, std: f64) -> Vec<f64> {
    let dist = Normal::new(mean, std).unwrap();
    (0..n).map(|_| dist.sample(rng)).collect()
}

/// Random walk with a per-step drift.
pub fn drifting_walk(rng: &mut ChaCha8Rng, n: usize, start: f64, drift: f64, std: f64) -> Vec<f64> {
    let dist = Normal::new(drift, std).unwrap();
    let mut level = start;
    (0..n)
        .map(|_| {
            level += dist.sample(rng);
            level
        })
        .collect()
}

/// Compound log returns into prices starting from 100.
pub fn prices_from_returns(returns: &[f64]) -> Vec<f64> {
    let mut level = 100.0;
    returns
        .iter()
        .map(|r| {
            level *= r.exp();
            level
        })
        .collect()
}

pub fn single_column(index: &[NaiveDate], name: &str, values: Vec<f64>) -> Panel {
    Panel::from_values(index.to_vec(), vec![name.to_string()], vec![values]).unwrap()
}

/// Three assets whose returns load on `fed_rate` with the given betas, a
/// white-noise `fed_rate` and a trending `inflation` level.
pub fn planted_market(n: usize, betas: [f64; 3], seed: u64) -> MockDataPort {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let index = days(date(2024, 6, 28), n);
    let rate = white_noise(&mut rng, n, RATE_MEAN, 0.001);
    let inflation = drifting_walk(&mut rng, n, 2.0, 0.01, 0.002);

    let tickers = ["AAA", "BBB", "CCC"];
    let prices = betas
        .iter()
        .map(|beta| {
            let returns: Vec<f64> = white_noise(&mut rng, n, 0.0001, 0.01)
                .into_iter()
                .zip(&rate)
                .map(|(noise, r)| noise + beta * (r - RATE_MEAN))
                .collect();
            prices_from_returns(&returns)
        })
        .collect();
    let prices = Panel::from_values(
        index.clone(),
        tickers.iter().map(|t| t.to_string()).collect(),
        prices,
    )
    .unwrap();

    MockDataPort::new(prices)
        .with_indicator("fed_rate", single_column(&index, "fed_rate", rate))
        .with_indicator("inflation", single_column(&index, "inflation", inflation))
}

/// INI for the three-asset mock market with small forests.
pub const MOCK_INI: &str = r#"
[data]
tickers = AAA, BBB, CCC
indicators = fed_rate, inflation
treatment = fed_rate
start_date = 2023-01-01
end_date = 2024-12-31

[estimator]
seed = 7
nuisance_trees = 30
trees = 30

[output]
version = test
"#;

pub fn config_from(ini: &str) -> PipelineConfig {
    let adapter = FileConfigAdapter::from_string(ini).unwrap();
    build_pipeline_config(&adapter).unwrap()
}

pub fn mock_config() -> PipelineConfig {
    config_from(MOCK_INI)
}
