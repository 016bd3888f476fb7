//! End-to-end run: fetch, align, screen, estimate, allocate, backtest.
//!
//! Every failure is reported as a [`PipelineError`] carrying the stage that
//! raised it. There are no retries and no fallback values.

use crate::domain::align::{align, Aligned};
use crate::domain::backtest::{backtest, ReturnSeries};
use crate::domain::config::PipelineConfig;
use crate::domain::encoding::CovariateMatrix;
use crate::domain::error::{AtStage, CausalError, PipelineError, Stage};
use crate::domain::estimator::{estimate_ate_linear, estimate_effects, EffectEstimate};
use crate::domain::metrics::PerformanceSummary;
use crate::domain::panel::Panel;
use crate::domain::portfolio::{causal_weights, markowitz_weights_with, sample_moments};
use crate::domain::returns::log_returns;
use crate::domain::stationarity::{check, difference_non_stationary, StationarityReport};
use crate::ports::data_port::DataPort;
use crate::ports::persistence_port::PersistencePort;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Aligned data ready for estimation.
#[derive(Debug, Clone)]
pub struct Prepared {
    /// Aligned asset returns and indicators, before any differencing.
    pub aligned: Aligned,
    pub stationarity: StationarityReport,
    pub differenced: Vec<String>,
    /// Merged returns and indicators after differencing, with no gaps.
    pub causal_panel: Panel,
}

#[derive(Debug, Clone)]
pub struct Allocation {
    pub assets: Vec<String>,
    pub causal: Vec<f64>,
    pub markowitz: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct BacktestReport {
    pub causal: ReturnSeries,
    pub markowitz: ReturnSeries,
    pub causal_summary: PerformanceSummary,
    pub markowitz_summary: PerformanceSummary,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub prepared: Prepared,
    pub effects: EffectEstimate,
    pub allocation: Allocation,
    pub backtest: BacktestReport,
    pub stored: Vec<PathBuf>,
}

/// Fetch prices and indicators, convert to returns, align, and difference
/// non-stationary columns once.
pub fn prepare(config: &PipelineConfig, data: &dyn DataPort) -> Result<Prepared, PipelineError> {
    let data_config = &config.data;
    let (start, end) = (data_config.start_date, data_config.end_date);

    tracing::info!(tickers = ?data_config.tickers, %start, %end, "fetching prices");
    let prices = data.fetch_prices(&data_config.tickers, start, end).at(Stage::Fetch)?;
    if prices.is_empty() {
        return Err(CausalError::NoData {
            series: "prices".into(),
        })
        .at(Stage::Fetch);
    }

    let mut indicators = BTreeMap::new();
    for name in &data_config.indicators {
        let panel = data.fetch_indicator(name, start, end).at(Stage::Fetch)?;
        if panel.is_empty() {
            return Err(CausalError::NoData { series: name.clone() }).at(Stage::Fetch);
        }
        indicators.insert(name.clone(), panel);
    }
    tracing::info!(rows = prices.len(), indicators = indicators.len(), "fetched data");

    let returns = log_returns(&prices).at(Stage::Returns)?;

    let aligned = align(&returns, &indicators, data_config.frequency).at(Stage::Align)?;
    tracing::info!(
        rows = aligned.index().len(),
        frequency = %data_config.frequency,
        "aligned series"
    );

    let merged = aligned.merged().at(Stage::Stationarity)?;
    let stationarity = check(&merged, config.significance);
    for name in stationarity.non_stationary() {
        tracing::warn!(column = %name, "series is not stationary");
    }
    let (differenced_panel, differenced) = difference_non_stationary(&merged, &stationarity);
    let causal_panel = differenced_panel.drop_incomplete_rows();
    if causal_panel.is_empty() {
        return Err(CausalError::InvalidPanel {
            reason: "no complete rows left after differencing".into(),
        })
        .at(Stage::Stationarity);
    }

    Ok(Prepared {
        aligned,
        stationarity,
        differenced,
        causal_panel,
    })
}

/// Per-asset effect of the treatment indicator on each asset's returns,
/// controlling for the other indicators.
pub fn estimate(config: &PipelineConfig, prepared: &Prepared) -> Result<EffectEstimate, PipelineError> {
    let panel = &prepared.causal_panel;
    let covariates = config.data.covariates();

    let x = CovariateMatrix::from_panel(panel, &covariates).at(Stage::Estimate)?;
    let t = panel
        .dense_column(&config.data.treatment)
        .at(Stage::Estimate)?;
    let outcomes = panel.select(&config.data.tickers).at(Stage::Estimate)?;

    tracing::info!(
        treatment = %config.data.treatment,
        covariates = ?covariates,
        rows = panel.len(),
        "estimating treatment effects"
    );
    let effects = estimate_effects(&x, &t, &outcomes, &config.estimator).at(Stage::Estimate)?;
    for (asset, effect) in effects.assets.iter().zip(&effects.effects) {
        tracing::info!(asset = %asset, effect, "treatment effect");
    }
    Ok(effects)
}

/// OLS average effect of the treatment on each asset, adjusting linearly for
/// the covariates. Same rows and inputs as [`estimate`].
pub fn linear_effects(config: &PipelineConfig, prepared: &Prepared) -> Result<Vec<f64>, PipelineError> {
    let panel = &prepared.causal_panel;
    let x = CovariateMatrix::from_panel(panel, &config.data.covariates()).at(Stage::Estimate)?;
    let t = panel
        .dense_column(&config.data.treatment)
        .at(Stage::Estimate)?;

    config
        .data
        .tickers
        .iter()
        .map(|asset| {
            let y = panel.dense_column(asset)?;
            estimate_ate_linear(&x, &t, &y)
        })
        .collect::<Result<Vec<_>, _>>()
        .at(Stage::Estimate)
}

/// Causal and mean-variance weights. Moments come from the aligned asset
/// returns only.
pub fn allocate(
    config: &PipelineConfig,
    prepared: &Prepared,
    effects: &EffectEstimate,
) -> Result<Allocation, PipelineError> {
    let causal = causal_weights(&effects.effects, config.portfolio.allow_short).at(Stage::CausalWeights)?;

    let asset_returns = prepared
        .aligned
        .equity
        .select(&effects.assets)
        .at(Stage::MarkowitzWeights)?;
    let (mu, covariance) = sample_moments(&asset_returns).at(Stage::MarkowitzWeights)?;
    let markowitz =
        markowitz_weights_with(&mu, &covariance, &config.portfolio.markowitz).at(Stage::MarkowitzWeights)?;

    Ok(Allocation {
        assets: effects.assets.clone(),
        causal,
        markowitz,
    })
}

pub fn run_backtests(
    config: &PipelineConfig,
    prepared: &Prepared,
    allocation: &Allocation,
) -> Result<BacktestReport, PipelineError> {
    let returns = prepared
        .aligned
        .equity
        .select(&allocation.assets)
        .at(Stage::Backtest)?;
    let causal = backtest(&allocation.causal, &returns).at(Stage::Backtest)?;
    let markowitz = backtest(&allocation.markowitz, &returns).at(Stage::Backtest)?;

    let rf = config.portfolio.risk_free_rate;
    let periods_per_year = config.data.frequency.periods_per_year();
    Ok(BacktestReport {
        causal_summary: PerformanceSummary::compute(&causal, rf, periods_per_year),
        markowitz_summary: PerformanceSummary::compute(&markowitz, rf, periods_per_year),
        causal,
        markowitz,
    })
}

/// Run every stage; when `store` is given, persist the intermediate panels
/// under the configured version.
pub fn run_pipeline(
    config: &PipelineConfig,
    data: &dyn DataPort,
    store: Option<&dyn PersistencePort>,
) -> Result<PipelineOutput, PipelineError> {
    let prepared = prepare(config, data)?;
    let effects = estimate(config, &prepared)?;
    let allocation = allocate(config, &prepared, &effects)?;
    let backtest = run_backtests(config, &prepared, &allocation)?;

    let stored = match store {
        Some(store) => persist(store, &config.output.version, &prepared, &backtest)?,
        None => Vec::new(),
    };

    tracing::info!(
        causal_sharpe = backtest.causal_summary.sharpe_ratio,
        markowitz_sharpe = backtest.markowitz_summary.sharpe_ratio,
        "pipeline finished"
    );
    Ok(PipelineOutput {
        prepared,
        effects,
        allocation,
        backtest,
        stored,
    })
}

fn persist(
    store: &dyn PersistencePort,
    version: &str,
    prepared: &Prepared,
    backtest: &BacktestReport,
) -> Result<Vec<PathBuf>, PipelineError> {
    let mut stored = vec![store
        .store("aligned_returns", version, &prepared.aligned.equity)
        .at(Stage::Persist)?];
    for (name, panel) in &prepared.aligned.indicators {
        stored.push(store.store(name, version, panel).at(Stage::Persist)?);
    }
    stored.push(
        store
            .store("merged_for_causal", version, &prepared.causal_panel)
            .at(Stage::Persist)?,
    );

    let returns = backtest
        .causal
        .to_panel("causal")
        .and_then(|causal| causal.join(&backtest.markowitz.to_panel("markowitz")?))
        .at(Stage::Persist)?;
    stored.push(store.store("backtest_returns", version, &returns).at(Stage::Persist)?);
    Ok(stored)
}
