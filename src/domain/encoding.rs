//! Covariate encoding.
//!
//! Numeric columns pass through; categorical columns are one-hot expanded with
//! the lexicographically first level dropped as the reference.

use crate::domain::error::CausalError;
use crate::domain::panel::Panel;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub enum CovariateValues {
    Numeric(Vec<f64>),
    Categorical(Vec<String>),
}

impl CovariateValues {
    fn len(&self) -> usize {
        match self {
            CovariateValues::Numeric(v) => v.len(),
            CovariateValues::Categorical(v) => v.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Covariate {
    pub name: String,
    pub values: CovariateValues,
}

impl Covariate {
    pub fn numeric(name: &str, values: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            values: CovariateValues::Numeric(values),
        }
    }

    pub fn categorical(name: &str, values: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            values: CovariateValues::Categorical(values),
        }
    }
}

/// Numeric design matrix, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct CovariateMatrix {
    names: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl CovariateMatrix {
    /// Encode covariates observed over `n_rows` observations.
    pub fn encode(covariates: &[Covariate], n_rows: usize) -> Result<Self, CausalError> {
        let mut names = Vec::new();
        let mut columns: Vec<Vec<f64>> = Vec::new();

        for covariate in covariates {
            if covariate.values.len() != n_rows {
                return Err(CausalError::Estimation {
                    reason: format!(
                        "covariate {} has {} rows, expected {}",
                        covariate.name,
                        covariate.values.len(),
                        n_rows
                    ),
                });
            }
            match &covariate.values {
                CovariateValues::Numeric(values) => {
                    if values.iter().any(|v| !v.is_finite()) {
                        return Err(CausalError::Estimation {
                            reason: format!("covariate {} has non-finite values", covariate.name),
                        });
                    }
                    names.push(covariate.name.clone());
                    columns.push(values.clone());
                }
                CovariateValues::Categorical(values) => {
                    let levels: BTreeSet<&str> = values.iter().map(String::as_str).collect();
                    for level in levels.into_iter().skip(1) {
                        names.push(format!("{}_{}", covariate.name, level));
                        columns.push(
                            values
                                .iter()
                                .map(|v| if v == level { 1.0 } else { 0.0 })
                                .collect(),
                        );
                    }
                }
            }
        }

        let rows = (0..n_rows)
            .map(|r| columns.iter().map(|column| column[r]).collect())
            .collect();
        Ok(Self { names, rows })
    }

    /// Numeric covariates taken from panel columns. Every cell must be present.
    pub fn from_panel(panel: &Panel, columns: &[String]) -> Result<Self, CausalError> {
        let covariates = columns
            .iter()
            .map(|name| {
                panel
                    .dense_column(name)
                    .map(|values| Covariate::numeric(name, values))
                    .map_err(|e| CausalError::Estimation {
                        reason: format!("covariate {name}: {e}"),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::encode(&covariates, panel.len())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_features(&self) -> usize {
        self.names.len()
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn row(&self, r: usize) -> &[f64] {
        &self.rows[r]
    }
}
