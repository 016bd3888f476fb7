//! Fixed-weight backtest over a return panel.

use crate::domain::error::CausalError;
use crate::domain::panel::Panel;
use chrono::NaiveDate;

/// One portfolio return per date.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnSeries {
    pub index: Vec<NaiveDate>,
    pub values: Vec<f64>,
}

impl ReturnSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.index.iter().copied().zip(self.values.iter().copied())
    }

    pub fn to_panel(&self, name: &str) -> Result<Panel, CausalError> {
        Panel::from_values(self.index.clone(), vec![name.to_string()], vec![self.values.clone()])
    }
}

/// Portfolio return on each date: the dot product of `weights` with that row.
///
/// Weights are held constant; there is no rebalancing or cost model.
pub fn backtest(weights: &[f64], returns: &Panel) -> Result<ReturnSeries, CausalError> {
    if weights.len() != returns.width() {
        return Err(CausalError::DimensionMismatch {
            expected: returns.width(),
            actual: weights.len(),
        });
    }

    let values = (0..returns.len())
        .map(|row| {
            returns
                .dense_row(row)
                .map(|cells| cells.iter().zip(weights).map(|(r, w)| r * w).sum())
        })
        .collect::<Result<Vec<f64>, _>>()?;

    Ok(ReturnSeries {
        index: returns.index().to_vec(),
        values,
    })
}
