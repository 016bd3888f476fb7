//! Heterogeneous treatment effects via double machine learning.
//!
//! Fitting happens in two stages:
//!
//! 1. Nuisance models `E[T|X]` and `E[Y|X]` are random forests, cross-fitted
//!    over contiguous folds so every residual is out-of-fold.
//! 2. A forest of weighted trees is fitted to the pseudo-outcome `Ỹ/T̃` with
//!    weights `T̃²`. Each leaf then holds `Σ T̃·Ỹ / Σ T̃²`, the local least-squares
//!    solution of `Ỹ ≈ θ(x)·T̃`.
//!
//! [`CausalForestDml`] holds configuration only; [`FittedCausalForest`] holds
//! the fitted effect model, so an effect can never be queried before fitting.

use crate::domain::encoding::CovariateMatrix;
use crate::domain::error::CausalError;
use crate::domain::forest::{ForestConfig, RandomForest, Sampling, TreeConfig};
use crate::domain::panel::Panel;
use nalgebra::{DMatrix, DVector};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

const MIN_VARIANCE: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub struct DmlConfig {
    pub folds: usize,
    pub nuisance: ForestConfig,
    pub effect: ForestConfig,
    pub seed: u64,
}

impl Default for DmlConfig {
    fn default() -> Self {
        Self {
            folds: 2,
            nuisance: ForestConfig {
                n_trees: 100,
                tree: TreeConfig {
                    min_samples_leaf: 10,
                    ..TreeConfig::default()
                },
                sampling: Sampling::Bootstrap,
                seed: 0,
            },
            effect: ForestConfig {
                n_trees: 100,
                tree: TreeConfig {
                    min_samples_leaf: 5,
                    ..TreeConfig::default()
                },
                sampling: Sampling::Subsample(0.5),
                seed: 0,
            },
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CausalForestDml {
    config: DmlConfig,
}

#[derive(Debug, Clone)]
pub struct FittedCausalForest {
    effect_model: RandomForest,
    n_features: usize,
}

impl CausalForestDml {
    pub fn new(config: DmlConfig) -> Self {
        Self { config }
    }

    pub fn fit(
        &self,
        x: &CovariateMatrix,
        t: &[f64],
        y: &[f64],
    ) -> Result<FittedCausalForest, CausalError> {
        let config = &self.config;
        let n = t.len();
        validate_inputs(config, x, t, y)?;

        // Every forest gets its own seed drawn from one master stream.
        let mut seeds = ChaCha8Rng::seed_from_u64(config.seed);
        let rows = x.rows();

        let mut t_hat = vec![0.0; n];
        let mut y_hat = vec![0.0; n];
        for fold in 0..config.folds {
            let (start, end) = fold_bounds(n, config.folds, fold);
            let train: Vec<usize> = (0..n).filter(|r| *r < start || *r >= end).collect();
            let train_x: Vec<Vec<f64>> = train.iter().map(|&r| rows[r].clone()).collect();
            let train_t: Vec<f64> = train.iter().map(|&r| t[r]).collect();
            let train_y: Vec<f64> = train.iter().map(|&r| y[r]).collect();

            let t_model = RandomForest::fit(
                &seeded(&config.nuisance, seeds.next_u64()),
                &train_x,
                &train_t,
                None,
            )?;
            let y_model = RandomForest::fit(
                &seeded(&config.nuisance, seeds.next_u64()),
                &train_x,
                &train_y,
                None,
            )?;
            for r in start..end {
                t_hat[r] = t_model.predict_one(&rows[r]);
                y_hat[r] = y_model.predict_one(&rows[r]);
            }
        }

        let t_res: Vec<f64> = t.iter().zip(&t_hat).map(|(a, b)| a - b).collect();
        let y_res: Vec<f64> = y.iter().zip(&y_hat).map(|(a, b)| a - b).collect();

        let residual_variance = t_res.iter().map(|v| v * v).sum::<f64>() / n as f64;
        if residual_variance <= MIN_VARIANCE {
            return Err(CausalError::Estimation {
                reason: "treatment has no variation left after conditioning on covariates".into(),
            });
        }

        let (pseudo, weights): (Vec<f64>, Vec<f64>) = t_res
            .iter()
            .zip(&y_res)
            .map(|(&tr, &yr)| if tr == 0.0 { (0.0, 0.0) } else { (yr / tr, tr * tr) })
            .unzip();

        let effect_model = RandomForest::fit(
            &seeded(&config.effect, seeds.next_u64()),
            rows,
            &pseudo,
            Some(&weights),
        )?;
        tracing::debug!(
            rows = n,
            features = x.n_features(),
            residual_variance,
            "fitted causal forest"
        );

        Ok(FittedCausalForest {
            effect_model,
            n_features: x.n_features(),
        })
    }
}

impl FittedCausalForest {
    /// Conditional effect per row of `x`.
    pub fn effect(&self, x: &CovariateMatrix) -> Result<Vec<f64>, CausalError> {
        if x.n_features() != self.n_features {
            return Err(CausalError::Estimation {
                reason: format!(
                    "model fitted on {} covariates, got {}",
                    self.n_features,
                    x.n_features()
                ),
            });
        }
        Ok(self.effect_model.predict(x.rows()))
    }

    /// Mean conditional effect over the rows of `x`.
    pub fn average_effect(&self, x: &CovariateMatrix) -> Result<f64, CausalError> {
        let effects = self.effect(x)?;
        if effects.is_empty() {
            return Err(CausalError::Estimation {
                reason: "no rows to average the effect over".into(),
            });
        }
        Ok(effects.iter().sum::<f64>() / effects.len() as f64)
    }
}

fn seeded(config: &ForestConfig, seed: u64) -> ForestConfig {
    ForestConfig {
        seed,
        ..config.clone()
    }
}

fn fold_bounds(n: usize, folds: usize, fold: usize) -> (usize, usize) {
    (fold * n / folds, (fold + 1) * n / folds)
}

fn validate_inputs(
    config: &DmlConfig,
    x: &CovariateMatrix,
    t: &[f64],
    y: &[f64],
) -> Result<(), CausalError> {
    let n = t.len();
    if x.n_rows() != n || y.len() != n {
        return Err(CausalError::Estimation {
            reason: format!(
                "row counts differ: X has {}, T has {}, Y has {}",
                x.n_rows(),
                n,
                y.len()
            ),
        });
    }
    if config.folds < 2 {
        return Err(CausalError::Estimation {
            reason: format!("cross-fitting needs at least 2 folds, got {}", config.folds),
        });
    }
    let min_rows = config.folds * config.nuisance.tree.min_samples_leaf.max(1);
    if n < min_rows {
        return Err(CausalError::Estimation {
            reason: format!("{n} rows is fewer than the {min_rows} the fold/leaf settings need"),
        });
    }
    let all_finite = t.iter().chain(y).all(|v| v.is_finite())
        && x.rows().iter().flatten().all(|v| v.is_finite());
    if !all_finite {
        return Err(CausalError::Estimation {
            reason: "inputs contain non-finite values".into(),
        });
    }
    let mean = t.iter().sum::<f64>() / n as f64;
    let variance = t.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    if variance <= MIN_VARIANCE {
        return Err(CausalError::Estimation {
            reason: "treatment is constant".into(),
        });
    }
    Ok(())
}

/// Per-asset effect of the treatment, ordered like the outcome panel's columns.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectEstimate {
    pub assets: Vec<String>,
    pub effects: Vec<f64>,
}

/// Fit a fresh causal forest per outcome column and average its CATE.
pub fn estimate_effects(
    x: &CovariateMatrix,
    t: &[f64],
    outcomes: &Panel,
    config: &DmlConfig,
) -> Result<EffectEstimate, CausalError> {
    if outcomes.is_empty() {
        return Err(CausalError::Estimation {
            reason: "outcome panel is empty".into(),
        });
    }

    let mut effects = Vec::with_capacity(outcomes.width());
    for asset in outcomes.columns() {
        let y = outcomes
            .dense_column(asset)
            .map_err(|e| CausalError::Estimation {
                reason: format!("outcome {asset}: {e}"),
            })?;
        let model = CausalForestDml::new(config.clone()).fit(x, t, &y)?;
        let effect = model.average_effect(x)?;
        tracing::debug!(asset = %asset, effect, "estimated treatment effect");
        effects.push(effect);
    }

    Ok(EffectEstimate {
        assets: outcomes.columns().to_vec(),
        effects,
    })
}

/// Average effect of `t` on `y` by OLS of Y on [1, T, X] (linear backdoor
/// adjustment).
pub fn estimate_ate_linear(x: &CovariateMatrix, t: &[f64], y: &[f64]) -> Result<f64, CausalError> {
    let n = t.len();
    if x.n_rows() != n || y.len() != n {
        return Err(CausalError::Estimation {
            reason: "row counts of X, T and Y differ".into(),
        });
    }
    let k = 2 + x.n_features();
    if n <= k {
        return Err(CausalError::Estimation {
            reason: format!("{n} rows cannot identify {k} coefficients"),
        });
    }

    let design = DMatrix::from_fn(n, k, |r, c| match c {
        0 => 1.0,
        1 => t[r],
        _ => x.row(r)[c - 2],
    });
    let target = DVector::from_column_slice(y);
    let xtx_inv = (design.transpose() * &design)
        .try_inverse()
        .ok_or_else(|| CausalError::Estimation {
            reason: "design matrix is singular".into(),
        })?;
    let beta = xtx_inv * (design.transpose() * target);
    let ate = beta[1];
    if !ate.is_finite() {
        return Err(CausalError::Estimation {
            reason: "linear effect is not finite".into(),
        });
    }
    Ok(ate)
}

/// Scale effects by a treatment change of `rate_change_pct` percent.
pub fn simulate_rate_change(effects: &[f64], rate_change_pct: f64) -> Vec<f64> {
    effects.iter().map(|e| e * rate_change_pct / 100.0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::encoding::Covariate;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use rand_distr::{Distribution, Normal, StandardNormal};

    struct Planted {
        x: CovariateMatrix,
        t: Vec<f64>,
        y: Vec<f64>,
    }

    fn planted(effect: f64, n: usize, seed: u64) -> Planted {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let noise = Normal::new(0.0, 0.5).unwrap();
        let z: Vec<f64> = (0..n).map(|_| StandardNormal.sample(&mut rng)).collect();
        let t: Vec<f64> = z
            .iter()
            .map(|z| {
                let e: f64 = StandardNormal.sample(&mut rng);
                0.5 * z + e
            })
            .collect();
        let y = z
            .iter()
            .zip(&t)
            .map(|(z, t)| effect * t + z + noise.sample(&mut rng))
            .collect();
        let x = CovariateMatrix::encode(&[Covariate::numeric("z", z)], n).unwrap();
        Planted { x, t, y }
    }

    fn small_config() -> DmlConfig {
        let mut config = DmlConfig::default();
        config.nuisance.n_trees = 20;
        config.effect.n_trees = 20;
        config
    }

    #[test]
    fn recovers_planted_positive_effect() {
        let data = planted(2.0, 400, 1);
        let model = CausalForestDml::new(small_config())
            .fit(&data.x, &data.t, &data.y)
            .unwrap();
        let ate = model.average_effect(&data.x).unwrap();
        assert!((ate - 2.0).abs() < 0.4, "ate = {ate}");
    }

    #[test]
    fn recovers_planted_negative_effect() {
        let data = planted(-1.5, 400, 2);
        let model = CausalForestDml::new(small_config())
            .fit(&data.x, &data.t, &data.y)
            .unwrap();
        let ate = model.average_effect(&data.x).unwrap();
        assert!(ate < -1.0 && ate > -2.0, "ate = {ate}");
    }

    #[test]
    fn identical_seed_gives_identical_effects() {
        let data = planted(1.0, 200, 3);
        let estimator = CausalForestDml::new(small_config());
        let a = estimator.fit(&data.x, &data.t, &data.y).unwrap();
        let b = estimator.fit(&data.x, &data.t, &data.y).unwrap();
        assert_eq!(a.effect(&data.x).unwrap(), b.effect(&data.x).unwrap());
    }

    #[test]
    fn mismatched_rows_fail() {
        let data = planted(1.0, 100, 4);
        let err = CausalForestDml::new(small_config())
            .fit(&data.x, &data.t[..50], &data.y)
            .unwrap_err();
        assert!(matches!(err, CausalError::Estimation { .. }));
    }

    #[test]
    fn constant_treatment_fails() {
        let data = planted(1.0, 100, 5);
        let t = vec![0.25; 100];
        assert!(CausalForestDml::new(small_config()).fit(&data.x, &t, &data.y).is_err());
    }

    #[test]
    fn non_finite_outcome_fails() {
        let mut data = planted(1.0, 100, 6);
        data.y[10] = f64::NAN;
        assert!(CausalForestDml::new(small_config()).fit(&data.x, &data.t, &data.y).is_err());
    }

    #[test]
    fn too_few_rows_fail() {
        let data = planted(1.0, 15, 7);
        let err = CausalForestDml::new(small_config())
            .fit(&data.x, &data.t, &data.y)
            .unwrap_err();
        assert!(err.to_string().contains("fewer than"));
    }

    #[test]
    fn treatment_explained_by_covariates_fails() {
        let n = 120;
        let z: Vec<f64> = (0..n).map(|i| (i % 2) as f64).collect();
        let t = z.clone();
        let y: Vec<f64> = (0..n).map(|i| i as f64 * 0.01).collect();
        let x = CovariateMatrix::encode(&[Covariate::numeric("z", z)], n).unwrap();
        let err = CausalForestDml::new(small_config()).fit(&x, &t, &y).unwrap_err();
        assert!(err.to_string().contains("no variation"));
    }

    #[test]
    fn effects_per_asset_follow_column_order() {
        let data = planted(1.0, 200, 8);
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let index = (0..200).map(|i| start + chrono::Duration::days(i)).collect();
        let flipped: Vec<f64> = data.y.iter().map(|v| -v).collect();
        let outcomes = Panel::from_values(
            index,
            vec!["up".into(), "down".into()],
            vec![data.y.clone(), flipped],
        )
        .unwrap();

        let estimate = estimate_effects(&data.x, &data.t, &outcomes, &small_config()).unwrap();
        assert_eq!(estimate.assets, vec!["up".to_string(), "down".to_string()]);
        assert!(estimate.effects[0] > 0.0);
        assert!(estimate.effects[1] < 0.0);
    }

    #[test]
    fn empty_outcomes_fail() {
        let data = planted(1.0, 50, 9);
        assert!(estimate_effects(&data.x, &data.t, &Panel::empty(), &small_config()).is_err());
    }

    #[test]
    fn linear_ate_recovers_coefficient() {
        let data = planted(0.8, 500, 10);
        let ate = estimate_ate_linear(&data.x, &data.t, &data.y).unwrap();
        assert!((ate - 0.8).abs() < 0.1, "ate = {ate}");
    }

    #[test]
    fn rate_change_scales_effects() {
        let scaled = simulate_rate_change(&[0.5, -2.0], 25.0);
        assert_relative_eq!(scaled[0], 0.125);
        assert_relative_eq!(scaled[1], -0.5);
    }
}
