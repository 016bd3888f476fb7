//! Configuration validation.
//!
//! Checks every field a run reads before any data is fetched.

use crate::domain::align::Frequency;
use crate::domain::config::{read, read_list, require, DataSourceKind};
use crate::domain::error::CausalError;
use crate::domain::sample::INDICATORS;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub fn validate_pipeline_config(config: &dyn ConfigPort) -> Result<(), CausalError> {
    validate_source(config)?;
    validate_dates(config)?;
    validate_frequency(config)?;
    validate_treatment(config)?;
    validate_synthetic(config)?;
    validate_significance(config)?;
    validate_estimator(config)?;
    validate_portfolio(config)?;
    validate_output(config)?;
    Ok(())
}

fn validate_source(config: &dyn ConfigPort) -> Result<(), CausalError> {
    let source = read::<DataSourceKind>(config, "data", "source")?.unwrap_or(DataSourceKind::Synthetic);
    if source == DataSourceKind::Csv {
        for key in ["data_dir", "tickers", "indicators"] {
            match config.get_string("data", key) {
                Some(s) if !s.trim().is_empty() => {}
                _ => {
                    return Err(CausalError::ConfigMissing {
                        section: "data".to_string(),
                        key: key.to_string(),
                    })
                }
            }
        }
    }
    read_list(config, "data", "tickers")?;
    read_list(config, "data", "indicators")?;
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), CausalError> {
    let start_date: NaiveDate = require(config, "data", "start_date")?;
    let end_date: NaiveDate = require(config, "data", "end_date")?;

    if start_date >= end_date {
        return Err(CausalError::config_invalid(
            "data",
            "start_date",
            "start_date must be before end_date",
        ));
    }
    Ok(())
}

fn validate_frequency(config: &dyn ConfigPort) -> Result<(), CausalError> {
    read::<Frequency>(config, "data", "frequency")?;
    Ok(())
}

fn validate_treatment(config: &dyn ConfigPort) -> Result<(), CausalError> {
    let treatment = config
        .get_string("data", "treatment")
        .unwrap_or_else(|| "fed_rate".to_string());
    let indicators = read_list(config, "data", "indicators")?
        .unwrap_or_else(|| INDICATORS.iter().map(|(name, _, _)| name.to_string()).collect());

    if !indicators.iter().any(|name| *name == treatment.trim()) {
        return Err(CausalError::config_invalid(
            "data",
            "treatment",
            format!("treatment '{}' is not one of the indicators", treatment.trim()),
        ));
    }
    Ok(())
}

fn validate_synthetic(config: &dyn ConfigPort) -> Result<(), CausalError> {
    if read::<usize>(config, "data", "synthetic_assets")? == Some(0) {
        return Err(CausalError::config_invalid(
            "data",
            "synthetic_assets",
            "synthetic_assets must be at least 1",
        ));
    }
    if read::<usize>(config, "data", "synthetic_days")?.is_some_and(|days| days < 20) {
        return Err(CausalError::config_invalid(
            "data",
            "synthetic_days",
            "synthetic_days must be at least 20",
        ));
    }
    read::<u64>(config, "data", "synthetic_seed")?;
    Ok(())
}

fn validate_significance(config: &dyn ConfigPort) -> Result<(), CausalError> {
    let value = read::<f64>(config, "stationarity", "significance")?;
    if value.is_some_and(|v| !(v > 0.0 && v < 1.0)) {
        return Err(CausalError::config_invalid(
            "stationarity",
            "significance",
            "significance must be between 0 and 1",
        ));
    }
    Ok(())
}

fn validate_estimator(config: &dyn ConfigPort) -> Result<(), CausalError> {
    read::<u64>(config, "estimator", "seed")?;
    if read::<usize>(config, "estimator", "folds")?.is_some_and(|v| v < 2) {
        return Err(CausalError::config_invalid(
            "estimator",
            "folds",
            "folds must be at least 2",
        ));
    }
    for key in ["nuisance_trees", "nuisance_min_leaf", "trees", "min_leaf", "max_depth"] {
        if read::<usize>(config, "estimator", key)? == Some(0) {
            return Err(CausalError::config_invalid(
                "estimator",
                key,
                format!("{key} must be at least 1"),
            ));
        }
    }
    if read::<f64>(config, "estimator", "subsample")?.is_some_and(|v| !(v > 0.0 && v <= 1.0)) {
        return Err(CausalError::config_invalid(
            "estimator",
            "subsample",
            "subsample must be in (0, 1]",
        ));
    }
    Ok(())
}

fn validate_portfolio(config: &dyn ConfigPort) -> Result<(), CausalError> {
    if let Some(value) = config.get_string("portfolio", "allow_short") {
        if !matches!(
            value.trim().to_lowercase().as_str(),
            "true" | "false" | "yes" | "no" | "1" | "0"
        ) {
            return Err(CausalError::config_invalid(
                "portfolio",
                "allow_short",
                "allow_short must be true or false",
            ));
        }
    }

    if read::<f64>(config, "portfolio", "risk_aversion")?.is_some_and(|v| !(v.is_finite() && v >= 0.0)) {
        return Err(CausalError::config_invalid(
            "portfolio",
            "risk_aversion",
            "risk_aversion must be non-negative",
        ));
    }

    let lower = read::<f64>(config, "portfolio", "lower_bound")?.unwrap_or(0.0);
    let upper = read::<f64>(config, "portfolio", "upper_bound")?.unwrap_or(1.0);
    if !(lower.is_finite() && upper.is_finite() && lower < upper) {
        return Err(CausalError::config_invalid(
            "portfolio",
            "lower_bound",
            "lower_bound must be below upper_bound",
        ));
    }

    if read::<usize>(config, "portfolio", "max_iterations")? == Some(0) {
        return Err(CausalError::config_invalid(
            "portfolio",
            "max_iterations",
            "max_iterations must be at least 1",
        ));
    }
    if read::<f64>(config, "portfolio", "tolerance")?.is_some_and(|v| !(v > 0.0)) {
        return Err(CausalError::config_invalid(
            "portfolio",
            "tolerance",
            "tolerance must be positive",
        ));
    }
    if read::<f64>(config, "portfolio", "risk_free_rate")?.is_some_and(|v| !(0.0..1.0).contains(&v)) {
        return Err(CausalError::config_invalid(
            "portfolio",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    Ok(())
}

fn validate_output(config: &dyn ConfigPort) -> Result<(), CausalError> {
    if let Some(version) = config.get_string("output", "version") {
        let version = version.trim();
        if version.is_empty() || version.contains(['/', '\\']) {
            return Err(CausalError::config_invalid(
                "output",
                "version",
                "version must be a non-empty name without path separators",
            ));
        }
    }
    Ok(())
}
