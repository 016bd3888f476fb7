//! Portfolio weight construction.
//!
//! Two constructors share one contract: the returned vector sums to one and,
//! unless shorting is allowed, every entry lies in [0, 1].

use crate::domain::error::CausalError;
use crate::domain::panel::Panel;
use nalgebra::{DMatrix, DVector, SymmetricEigen};

/// Normalised exponentials of the effects.
///
/// Without shorting, assets with a negative effect get zero weight and the
/// rest share the allocation in proportion to `exp(effect)`.
pub fn causal_weights(effects: &[f64], allow_short: bool) -> Result<Vec<f64>, CausalError> {
    if effects.is_empty() {
        return Err(CausalError::DegenerateWeights {
            reason: "no effects to weight".into(),
        });
    }
    if effects.iter().any(|e| !e.is_finite()) {
        return Err(CausalError::DegenerateWeights {
            reason: "effects contain non-finite values".into(),
        });
    }

    let eligible = |e: f64| allow_short || e >= 0.0;
    let Some(max) = effects
        .iter()
        .copied()
        .filter(|e| eligible(*e))
        .reduce(f64::max)
    else {
        return Err(CausalError::DegenerateWeights {
            reason: "every effect is negative and shorting is disabled".into(),
        });
    };

    let exps: Vec<f64> = effects
        .iter()
        .map(|&e| if eligible(e) { (e - max).exp() } else { 0.0 })
        .collect();
    let total: f64 = exps.iter().sum();
    if !(total.is_finite() && total > 0.0) {
        return Err(CausalError::DegenerateWeights {
            reason: format!("normaliser is {total}"),
        });
    }
    Ok(exps.into_iter().map(|v| v / total).collect())
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkowitzConfig {
    pub risk_aversion: f64,
    pub lower: f64,
    pub upper: f64,
    pub max_iterations: usize,
    /// Stop once no weight moves by more than this between iterations.
    pub tolerance: f64,
}

impl Default for MarkowitzConfig {
    fn default() -> Self {
        Self {
            risk_aversion: 1.0,
            lower: 0.0,
            upper: 1.0,
            max_iterations: 100_000,
            tolerance: 1e-10,
        }
    }
}

/// Long-only mean-variance weights: minimise `-wᵀμ + λ·wᵀΣw` with `Σw = 1`.
pub fn markowitz_weights(
    expected_returns: &[f64],
    covariance: &DMatrix<f64>,
    risk_aversion: f64,
) -> Result<Vec<f64>, CausalError> {
    markowitz_weights_with(
        expected_returns,
        covariance,
        &MarkowitzConfig {
            risk_aversion,
            ..MarkowitzConfig::default()
        },
    )
}

/// Mean-variance weights under arbitrary box bounds, solved by accelerated
/// projected gradient from the uniform allocation.
pub fn markowitz_weights_with(
    expected_returns: &[f64],
    covariance: &DMatrix<f64>,
    config: &MarkowitzConfig,
) -> Result<Vec<f64>, CausalError> {
    validate_problem(expected_returns, covariance, config)?;
    let n = expected_returns.len();
    let mu = DVector::from_column_slice(expected_returns);
    let lambda = config.risk_aversion;

    let spectral_radius = SymmetricEigen::new(covariance.clone())
        .eigenvalues
        .iter()
        .fold(0.0f64, |acc, v| acc.max(v.abs()));
    let lipschitz = 2.0 * lambda * spectral_radius;
    let step = if lipschitz > 1e-12 { 1.0 / lipschitz } else { 1.0 };

    let gradient = |w: &DVector<f64>| -&mu + covariance * w * (2.0 * lambda);

    let mut w = project_capped_simplex(&DVector::from_element(n, 1.0 / n as f64), config.lower, config.upper)?;
    let mut momentum_point = w.clone();
    let mut t = 1.0f64;

    for iteration in 0..config.max_iterations {
        let raw = &momentum_point - gradient(&momentum_point) * step;
        let next = project_capped_simplex(&raw, config.lower, config.upper)?;

        let change = (&next - &w).amax();
        if change < config.tolerance {
            tracing::debug!(iterations = iteration + 1, "mean-variance solver converged");
            return Ok(next.iter().copied().collect());
        }

        // Restart the momentum when it points against the last step.
        let t_next = if (&momentum_point - &next).dot(&(&next - &w)) > 0.0 {
            momentum_point = next.clone();
            1.0
        } else {
            let t_next = (1.0 + (1.0 + 4.0 * t * t).sqrt()) / 2.0;
            momentum_point = &next + (&next - &w) * ((t - 1.0) / t_next);
            t_next
        };
        t = t_next;
        w = next;
    }

    Err(CausalError::Optimization {
        reason: format!(
            "mean-variance solver did not converge in {} iterations",
            config.max_iterations
        ),
    })
}

fn validate_problem(
    mu: &[f64],
    covariance: &DMatrix<f64>,
    config: &MarkowitzConfig,
) -> Result<(), CausalError> {
    let fail = |reason: String| Err(CausalError::Optimization { reason });
    let n = mu.len();
    if n == 0 {
        return fail("no assets to allocate".into());
    }
    if !covariance.is_square() {
        return fail(format!(
            "covariance is {}x{}, not square",
            covariance.nrows(),
            covariance.ncols()
        ));
    }
    if covariance.nrows() != n {
        return fail(format!(
            "covariance has {} rows but there are {n} expected returns",
            covariance.nrows()
        ));
    }
    if mu.iter().chain(covariance.iter()).any(|v| !v.is_finite()) {
        return fail("inputs contain non-finite values".into());
    }
    let scale = covariance.amax().max(1.0);
    for i in 0..n {
        for j in (i + 1)..n {
            if (covariance[(i, j)] - covariance[(j, i)]).abs() > 1e-9 * scale {
                return fail(format!("covariance is not symmetric at ({i}, {j})"));
            }
        }
    }
    if !(config.risk_aversion.is_finite() && config.risk_aversion >= 0.0) {
        return fail(format!("risk aversion {} must be finite and non-negative", config.risk_aversion));
    }
    if !(config.tolerance > 0.0) || config.max_iterations == 0 {
        return fail("solver needs a positive tolerance and iteration budget".into());
    }
    Ok(())
}

/// Euclidean projection onto `{w : Σw = 1, lower ≤ w_i ≤ upper}`.
///
/// Bisects on the shift `τ` in `clamp(v - τ, lower, upper)`.
pub fn project_capped_simplex(
    v: &DVector<f64>,
    lower: f64,
    upper: f64,
) -> Result<DVector<f64>, CausalError> {
    let n = v.len() as f64;
    if !(lower.is_finite() && upper.is_finite()) || lower > upper || n * lower > 1.0 || n * upper < 1.0 {
        return Err(CausalError::Optimization {
            reason: format!("bounds [{lower}, {upper}] cannot hold {n} weights summing to one"),
        });
    }

    let shifted_sum = |tau: f64| v.iter().map(|x| (x - tau).clamp(lower, upper)).sum::<f64>();
    let mut lo = v.min() - upper;
    let mut hi = v.max() - lower;
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if shifted_sum(mid) > 1.0 {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo <= f64::EPSILON * (1.0 + lo.abs().max(hi.abs())) {
            break;
        }
    }
    let tau = 0.5 * (lo + hi);
    Ok(v.map(|x| (x - tau).clamp(lower, upper)))
}

/// Column means and sample covariance (n − 1 denominator) of a return panel.
pub fn sample_moments(returns: &Panel) -> Result<(Vec<f64>, DMatrix<f64>), CausalError> {
    let rows = returns.len();
    let cols = returns.width();
    if rows < 2 || cols == 0 {
        return Err(CausalError::InvalidPanel {
            reason: format!("moments need at least 2 rows and 1 column, got {rows}x{cols}"),
        });
    }

    let columns = returns
        .columns()
        .iter()
        .map(|name| returns.dense_column(name))
        .collect::<Result<Vec<_>, _>>()?;
    let means: Vec<f64> = columns
        .iter()
        .map(|c| c.iter().sum::<f64>() / rows as f64)
        .collect();

    let covariance = DMatrix::from_fn(cols, cols, |i, j| {
        columns[i]
            .iter()
            .zip(&columns[j])
            .map(|(a, b)| (a - means[i]) * (b - means[j]))
            .sum::<f64>()
            / (rows - 1) as f64
    });
    Ok((means, covariance))
}
