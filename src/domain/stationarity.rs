//! Unit-root screening with the augmented Dickey-Fuller test.
//!
//! H0: the series has a unit root (non-stationary).
//! A column is stationary when the ADF p-value is below the significance level.
//! Columns with fewer than [`MIN_OBSERVATIONS`] points, or whose regression is
//! singular, are reported as non-stationary.

use crate::domain::panel::Panel;
use nalgebra::{DMatrix, DVector};
use statrs::function::erf::erfc;
use std::collections::BTreeMap;

pub const MIN_OBSERVATIONS: usize = 10;
pub const DEFAULT_SIGNIFICANCE: f64 = 0.05;

// MacKinnon (1994) response surface, constant-only regression, one variable.
const TAU_MAX: f64 = 2.74;
const TAU_MIN: f64 = -18.83;
const TAU_STAR: f64 = -1.61;
const TAU_SMALL_P: [f64; 3] = [2.1659, 1.4412, 0.038269];
const TAU_LARGE_P: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

#[derive(Debug, Clone, PartialEq)]
pub struct AdfResult {
    pub statistic: f64,
    pub p_value: f64,
    pub used_lag: usize,
    pub n_obs: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnStationarity {
    pub is_stationary: bool,
    /// `None` when the test could not be run.
    pub adf: Option<AdfResult>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StationarityReport {
    pub columns: BTreeMap<String, ColumnStationarity>,
}

impl StationarityReport {
    /// `{column: is_stationary}`.
    pub fn flags(&self) -> BTreeMap<String, bool> {
        self.columns
            .iter()
            .map(|(name, c)| (name.clone(), c.is_stationary))
            .collect()
    }

    pub fn non_stationary(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|(_, c)| !c.is_stationary)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Run the ADF test on every column of `panel`.
pub fn check(panel: &Panel, significance: f64) -> StationarityReport {
    let mut columns = BTreeMap::new();
    for (position, name) in panel.columns().iter().enumerate() {
        let series: Vec<f64> = panel.column_at(position).iter().flatten().copied().collect();
        let adf = if series.len() < MIN_OBSERVATIONS {
            tracing::warn!(column = %name, points = series.len(), "too few points for stationarity test");
            None
        } else {
            adf_test(&series, None)
        };
        let is_stationary = adf.as_ref().is_some_and(|r| r.p_value < significance);
        columns.insert(name.clone(), ColumnStationarity { is_stationary, adf });
    }
    StationarityReport { columns }
}

/// Replace every non-stationary column by its first difference, once.
/// Returns the transformed panel and the names of the differenced columns.
pub fn difference_non_stationary(panel: &Panel, report: &StationarityReport) -> (Panel, Vec<String>) {
    let flagged: Vec<String> = report
        .non_stationary()
        .into_iter()
        .filter(|name| panel.column_position(name).is_some())
        .collect();
    if flagged.is_empty() {
        return (panel.clone(), flagged);
    }
    tracing::warn!(columns = ?flagged, "differencing non-stationary series");
    (panel.difference_columns(&flagged), flagged)
}

/// Augmented Dickey-Fuller test with a constant, lag order chosen by AIC.
///
/// Regression: Δy_t = α + β·y_{t-1} + Σ γ_i·Δy_{t-i} + ε_t; the statistic is
/// the t-ratio of β.
pub fn adf_test(y: &[f64], max_lag: Option<usize>) -> Option<AdfResult> {
    let n = y.len();
    if n < MIN_OBSERVATIONS {
        return None;
    }
    let default_lag = (12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize;
    let max_lag = max_lag.unwrap_or(default_lag).min(n / 2 - 2);

    let diff: Vec<f64> = y.windows(2).map(|w| w[1] - w[0]).collect();

    // Select the lag on a common sample so the AICs are comparable.
    let mut best: Option<(f64, usize)> = None;
    for lag in 0..=max_lag {
        let Some(fit) = adf_regression(y, &diff, lag, max_lag) else {
            continue;
        };
        if best.is_none_or(|(aic, _)| fit.aic < aic) {
            best = Some((fit.aic, lag));
        }
    }
    let (_, used_lag) = best?;

    let fit = adf_regression(y, &diff, used_lag, used_lag)?;
    Some(AdfResult {
        statistic: fit.t_stat,
        p_value: mackinnon_p_value(fit.t_stat),
        used_lag,
        n_obs: fit.n_obs,
    })
}

struct AdfFit {
    t_stat: f64,
    aic: f64,
    n_obs: usize,
}

/// OLS of Δy_t on [1, y_t, Δy_{t-1}, ..., Δy_{t-lag}] for t in start..len(Δy).
fn adf_regression(y: &[f64], diff: &[f64], lag: usize, start: usize) -> Option<AdfFit> {
    let n_obs = diff.len().checked_sub(start)?;
    let k = 2 + lag;
    if n_obs <= k {
        return None;
    }

    let mut rows = Vec::with_capacity(n_obs * k);
    for t in start..diff.len() {
        rows.push(1.0);
        rows.push(y[t]);
        for i in 1..=lag {
            rows.push(diff[t - i]);
        }
    }
    let x = DMatrix::from_row_slice(n_obs, k, &rows);
    let target = DVector::from_column_slice(&diff[start..]);

    let xtx_inv = (x.transpose() * &x).try_inverse()?;
    let beta = &xtx_inv * (x.transpose() * &target);
    let residuals = &target - &x * &beta;
    let sse = residuals.norm_squared();
    let sigma2 = sse / (n_obs - k) as f64;
    let se = (sigma2 * xtx_inv[(1, 1)]).sqrt();
    if !se.is_finite() || se <= 0.0 {
        return None;
    }

    let n = n_obs as f64;
    Some(AdfFit {
        t_stat: beta[1] / se,
        aic: n * (sse / n).ln() + 2.0 * k as f64,
        n_obs,
    })
}

/// Approximate p-value of an ADF statistic (constant, no trend).
pub fn mackinnon_p_value(stat: f64) -> f64 {
    if stat > TAU_MAX {
        return 1.0;
    }
    if stat < TAU_MIN {
        return 0.0;
    }
    let z = if stat <= TAU_STAR {
        polyval(&TAU_SMALL_P, stat)
    } else {
        polyval(&TAU_LARGE_P, stat)
    };
    standard_normal_cdf(z)
}

fn polyval(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

fn standard_normal_cdf(z: f64) -> f64 {
    0.5 * erfc(-z / std::f64::consts::SQRT_2)
}
