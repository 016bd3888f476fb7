//! Performance statistics of a backtested return series.

use super::backtest::ReturnSeries;

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceSummary {
    pub periods: usize,
    pub cumulative_log_return: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    /// Longest run of periods spent below a previous peak.
    pub max_drawdown_duration: usize,
}

impl PerformanceSummary {
    /// Summarise a series of log returns sampled `periods_per_year` times a
    /// year. The wealth curve starts at 1.0 and compounds each period by
    /// `exp(r)`.
    pub fn compute(series: &ReturnSeries, risk_free_rate: f64, periods_per_year: f64) -> Self {
        let wealth = wealth_curve(&series.values);

        let cumulative_log_return: f64 = series.values.iter().sum();
        let total_return = cumulative_log_return.exp() - 1.0;

        let years = series.len() as f64 / periods_per_year;
        let annualized_return = if years > 0.0 && total_return.is_finite() {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(&wealth);

        let period_rf = risk_free_rate / periods_per_year;
        let (annualized_volatility, sharpe_ratio, sortino_ratio) =
            compute_risk_adjusted(&wealth, period_rf, periods_per_year);

        PerformanceSummary {
            periods: series.len(),
            cumulative_log_return,
            total_return,
            annualized_return,
            annualized_volatility,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
        }
    }
}

fn wealth_curve(log_returns: &[f64]) -> Vec<f64> {
    let mut wealth = Vec::with_capacity(log_returns.len() + 1);
    let mut level = 1.0;
    wealth.push(level);
    for r in log_returns {
        level *= r.exp();
        wealth.push(level);
    }
    wealth
}

fn compute_drawdown(wealth: &[f64]) -> (f64, usize) {
    let Some(&first) = wealth.first() else {
        return (0.0, 0);
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0usize;
    let mut current_dd_duration = 0usize;

    for &level in wealth {
        if level >= peak {
            peak = level;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - level) / peak);
            current_dd_duration += 1;
            max_dd_duration = max_dd_duration.max(current_dd_duration);
        }
    }

    (max_dd, max_dd_duration)
}

/// Annualised volatility, Sharpe and Sortino of the period returns of `wealth`.
fn compute_risk_adjusted(wealth: &[f64], period_rf: f64, periods_per_year: f64) -> (f64, f64, f64) {
    let returns: Vec<f64> = wealth
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect();

    if returns.is_empty() {
        return (0.0, 0.0, 0.0);
    }

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;
    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    let annualization = periods_per_year.sqrt();

    let excess_return = mean - period_rf;

    let sharpe = if stddev > 0.0 {
        (excess_return / stddev) * annualization
    } else {
        0.0
    };

    let downside_variance: f64 = returns
        .iter()
        .filter(|&&r| r < period_rf)
        .map(|&r| (r - period_rf).powi(2))
        .sum::<f64>()
        / n;
    let downside_stddev = downside_variance.sqrt();

    let sortino = if downside_stddev > 0.0 {
        (excess_return / downside_stddev) * annualization
    } else {
        0.0
    };

    (stddev * annualization, sharpe, sortino)
}
