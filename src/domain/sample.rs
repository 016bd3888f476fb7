//! Deterministic synthetic market data.

use crate::domain::error::CausalError;
use crate::domain::panel::Panel;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// Indicator columns and their (mean, standard deviation).
pub const INDICATORS: [(&str, f64, f64); 4] = [
    ("fed_rate", 0.02, 0.001),
    ("inflation", 0.02, 0.002),
    ("gdp_growth", 0.025, 0.003),
    ("unemployment", 0.05, 0.002),
];

const ASSET_MEAN: f64 = 0.0001;
const ASSET_STD: f64 = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub struct SampleSpec {
    pub num_assets: usize,
    pub num_days: usize,
    pub seed: u64,
    /// Last business day of the sample (or the weekday before it).
    pub end_date: NaiveDate,
    /// Sensitivity of each asset's return to `fed_rate` deviations from its
    /// mean. Missing entries are zero.
    pub rate_betas: Vec<f64>,
}

impl SampleSpec {
    pub fn new(end_date: NaiveDate) -> Self {
        Self {
            num_assets: 5,
            num_days: 100,
            seed: 42,
            end_date,
            rate_betas: Vec::new(),
        }
    }
}

pub fn asset_name(i: usize) -> String {
    format!("asset_{}", i + 1)
}

/// `num_days` business days ending on or before `end`.
pub fn business_days_ending(end: NaiveDate, num_days: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(num_days);
    let mut day = end;
    while days.len() < num_days {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(day);
        }
        day -= Duration::days(1);
    }
    days.reverse();
    days
}

/// Panel of `asset_1..asset_n` daily returns followed by the indicator columns.
pub fn generate_sample(spec: &SampleSpec) -> Result<Panel, CausalError> {
    if spec.num_assets == 0 || spec.num_days == 0 {
        return Err(CausalError::InvalidPanel {
            reason: format!(
                "sample needs at least one asset and one day, got {} assets over {} days",
                spec.num_assets, spec.num_days
            ),
        });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(spec.seed);
    let normal = |mean: f64, std: f64| {
        Normal::new(mean, std).map_err(|e| CausalError::InvalidPanel {
            reason: e.to_string(),
        })
    };

    let asset_noise = normal(ASSET_MEAN, ASSET_STD)?;
    let mut assets: Vec<Vec<f64>> = (0..spec.num_assets)
        .map(|_| (0..spec.num_days).map(|_| asset_noise.sample(&mut rng)).collect())
        .collect();

    let mut indicators = Vec::with_capacity(INDICATORS.len());
    for (_, mean, std) in INDICATORS {
        let dist = normal(mean, std)?;
        indicators.push((0..spec.num_days).map(|_| dist.sample(&mut rng)).collect::<Vec<f64>>());
    }

    let (_, rate_mean, _) = INDICATORS[0];
    for (asset, beta) in assets.iter_mut().zip(&spec.rate_betas) {
        for (value, rate) in asset.iter_mut().zip(&indicators[0]) {
            *value += beta * (rate - rate_mean);
        }
    }

    let columns = (0..spec.num_assets)
        .map(asset_name)
        .chain(INDICATORS.iter().map(|(name, _, _)| name.to_string()))
        .collect();
    assets.extend(indicators);

    Panel::from_values(business_days_ending(spec.end_date, spec.num_days), columns, assets)
}
