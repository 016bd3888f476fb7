//! Run configuration assembled from a [`ConfigPort`].

use crate::domain::align::Frequency;
use crate::domain::config_validation::validate_pipeline_config;
use crate::domain::error::CausalError;
use crate::domain::estimator::DmlConfig;
use crate::domain::forest::Sampling;
use crate::domain::portfolio::MarkowitzConfig;
use crate::domain::sample::{asset_name, INDICATORS};
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSourceKind {
    Csv,
    Synthetic,
}

impl FromStr for DataSourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(DataSourceKind::Csv),
            "synthetic" => Ok(DataSourceKind::Synthetic),
            other => Err(format!("unknown data source '{other}', expected csv or synthetic")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticConfig {
    pub assets: usize,
    pub days: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataConfig {
    pub source: DataSourceKind,
    pub data_dir: PathBuf,
    pub tickers: Vec<String>,
    pub indicators: Vec<String>,
    pub treatment: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub frequency: Frequency,
    pub synthetic: SyntheticConfig,
}

impl DataConfig {
    /// Indicators used as covariates: every indicator except the treatment.
    pub fn covariates(&self) -> Vec<String> {
        self.indicators
            .iter()
            .filter(|name| **name != self.treatment)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioConfig {
    pub allow_short: bool,
    pub markowitz: MarkowitzConfig,
    pub risk_free_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub significance: f64,
    pub estimator: DmlConfig,
    pub portfolio: PortfolioConfig,
    pub output: OutputConfig,
}

/// Validate `config` and read it into a [`PipelineConfig`], filling defaults.
pub fn build_pipeline_config(config: &dyn ConfigPort) -> Result<PipelineConfig, CausalError> {
    validate_pipeline_config(config)?;

    let source = read::<DataSourceKind>(config, "data", "source")?.unwrap_or(DataSourceKind::Synthetic);
    let synthetic = SyntheticConfig {
        assets: read(config, "data", "synthetic_assets")?.unwrap_or(5),
        days: read(config, "data", "synthetic_days")?.unwrap_or(100),
        seed: read(config, "data", "synthetic_seed")?.unwrap_or(42),
    };

    let tickers = match read_list(config, "data", "tickers")? {
        Some(list) => list,
        None => (0..synthetic.assets).map(asset_name).collect(),
    };
    let indicators = match read_list(config, "data", "indicators")? {
        Some(list) => list,
        None => INDICATORS.iter().map(|(name, _, _)| name.to_string()).collect(),
    };

    let data = DataConfig {
        source,
        data_dir: config
            .get_string("data", "data_dir")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data")),
        tickers,
        indicators,
        treatment: config
            .get_string("data", "treatment")
            .unwrap_or_else(|| "fed_rate".to_string()),
        start_date: require(config, "data", "start_date")?,
        end_date: require(config, "data", "end_date")?,
        frequency: read(config, "data", "frequency")?.unwrap_or_default(),
        synthetic,
    };

    let defaults = DmlConfig::default();
    let mut estimator = DmlConfig {
        folds: read(config, "estimator", "folds")?.unwrap_or(defaults.folds),
        seed: read(config, "estimator", "seed")?.unwrap_or(defaults.seed),
        ..defaults
    };
    estimator.nuisance.n_trees = read(config, "estimator", "nuisance_trees")?.unwrap_or(estimator.nuisance.n_trees);
    estimator.nuisance.tree.min_samples_leaf = read(config, "estimator", "nuisance_min_leaf")?
        .unwrap_or(estimator.nuisance.tree.min_samples_leaf);
    estimator.effect.n_trees = read(config, "estimator", "trees")?.unwrap_or(estimator.effect.n_trees);
    estimator.effect.tree.min_samples_leaf =
        read(config, "estimator", "min_leaf")?.unwrap_or(estimator.effect.tree.min_samples_leaf);
    estimator.effect.tree.max_depth = read(config, "estimator", "max_depth")?;
    if let Some(fraction) = read(config, "estimator", "subsample")? {
        estimator.effect.sampling = Sampling::Subsample(fraction);
    }

    let markowitz_defaults = MarkowitzConfig::default();
    let portfolio = PortfolioConfig {
        allow_short: config.get_bool("portfolio", "allow_short", false),
        markowitz: MarkowitzConfig {
            risk_aversion: read(config, "portfolio", "risk_aversion")?
                .unwrap_or(markowitz_defaults.risk_aversion),
            lower: read(config, "portfolio", "lower_bound")?.unwrap_or(markowitz_defaults.lower),
            upper: read(config, "portfolio", "upper_bound")?.unwrap_or(markowitz_defaults.upper),
            max_iterations: read(config, "portfolio", "max_iterations")?
                .unwrap_or(markowitz_defaults.max_iterations),
            tolerance: read(config, "portfolio", "tolerance")?.unwrap_or(markowitz_defaults.tolerance),
        },
        risk_free_rate: read(config, "portfolio", "risk_free_rate")?.unwrap_or(0.0),
    };

    let output = OutputConfig {
        dir: config
            .get_string("output", "dir")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("output")),
        version: config
            .get_string("output", "version")
            .unwrap_or_else(|| "v1".to_string()),
    };

    Ok(PipelineConfig {
        data,
        significance: read(config, "stationarity", "significance")?
            .unwrap_or(crate::domain::stationarity::DEFAULT_SIGNIFICANCE),
        estimator,
        portfolio,
        output,
    })
}

/// Parse an optional typed value; present-but-unparseable is an error.
pub(crate) fn read<T>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<T>, CausalError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| CausalError::config_invalid(section, key, format!("'{}': {e}", raw.trim()))),
    }
}

pub(crate) fn require<T>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<T, CausalError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    read(config, section, key)?.ok_or_else(|| CausalError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    })
}

pub(crate) fn read_list(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<Vec<String>>, CausalError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => parse_list(&raw)
            .map(Some)
            .map_err(|reason| CausalError::config_invalid(section, key, reason)),
    }
}

/// Split a comma-separated list, rejecting empty and duplicate entries.
pub fn parse_list(input: &str) -> Result<Vec<String>, String> {
    let mut items = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let item = token.trim();
        if item.is_empty() {
            return Err("list contains an empty entry".to_string());
        }
        if !seen.insert(item.to_string()) {
            return Err(format!("duplicate entry '{item}'"));
        }
        items.push(item.to_string());
    }

    Ok(items)
}
