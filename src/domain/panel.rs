//! Time-indexed table of numeric columns.
//!
//! A [`Panel`] owns a strictly increasing date index and one column per asset
//! or indicator. Cells are `Option<f64>`; `None` marks a missing observation.
//! Non-finite floats are never stored.

use crate::domain::error::CausalError;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    index: Vec<NaiveDate>,
    columns: Vec<String>,
    data: Vec<Vec<Option<f64>>>,
}

impl Panel {
    /// Build a panel from column-major data.
    pub fn new(
        index: Vec<NaiveDate>,
        columns: Vec<String>,
        data: Vec<Vec<Option<f64>>>,
    ) -> Result<Self, CausalError> {
        if columns.len() != data.len() {
            return Err(CausalError::InvalidPanel {
                reason: format!("{} column names for {} columns", columns.len(), data.len()),
            });
        }
        if let Some(pair) = index.windows(2).find(|w| w[0] >= w[1]) {
            return Err(CausalError::InvalidPanel {
                reason: format!(
                    "index must be strictly increasing ({} followed by {})",
                    pair[0], pair[1]
                ),
            });
        }
        let mut seen = HashSet::new();
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(CausalError::InvalidPanel {
                    reason: format!("duplicate column {name}"),
                });
            }
        }
        for (name, column) in columns.iter().zip(&data) {
            if column.len() != index.len() {
                return Err(CausalError::InvalidPanel {
                    reason: format!(
                        "column {name} has {} rows, index has {}",
                        column.len(),
                        index.len()
                    ),
                });
            }
        }
        let data = data
            .into_iter()
            .map(|column| {
                column
                    .into_iter()
                    .map(|v| v.filter(|x| x.is_finite()))
                    .collect()
            })
            .collect();
        Ok(Self {
            index,
            columns,
            data,
        })
    }

    /// Build a panel from dense columns; non-finite values become missing.
    pub fn from_values(
        index: Vec<NaiveDate>,
        columns: Vec<String>,
        data: Vec<Vec<f64>>,
    ) -> Result<Self, CausalError> {
        let data = data
            .into_iter()
            .map(|column| column.into_iter().map(Some).collect())
            .collect();
        Self::new(index, columns, data)
    }

    /// Build a panel from `(date, value)` observations that may arrive unsorted.
    /// A date seen twice fails rather than silently keeping one value.
    pub fn from_observations(
        name: &str,
        observations: impl IntoIterator<Item = (NaiveDate, f64)>,
    ) -> Result<Self, CausalError> {
        let mut by_date = BTreeMap::new();
        for (date, value) in observations {
            if by_date.insert(date, value).is_some() {
                return Err(CausalError::InvalidPanel {
                    reason: format!("duplicate date {date} in {name}"),
                });
            }
        }
        let (index, values): (Vec<_>, Vec<_>) = by_date.into_iter().unzip();
        Self::from_values(index, vec![name.to_string()], vec![values])
    }

    pub fn empty() -> Self {
        Self {
            index: Vec::new(),
            columns: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn index(&self) -> &[NaiveDate] {
        &self.index
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty() || self.columns.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.column_position(name).map(|i| self.data[i].as_slice())
    }

    pub fn column_at(&self, position: usize) -> &[Option<f64>] {
        &self.data[position]
    }

    pub fn value(&self, row: usize, column: usize) -> Option<f64> {
        self.data[column][row]
    }

    /// The named column with every cell present.
    pub fn dense_column(&self, name: &str) -> Result<Vec<f64>, CausalError> {
        let column = self.column(name).ok_or_else(|| CausalError::InvalidPanel {
            reason: format!("no column {name}"),
        })?;
        column
            .iter()
            .zip(&self.index)
            .map(|(v, date)| {
                v.ok_or_else(|| CausalError::MissingValue {
                    column: name.to_string(),
                    date: *date,
                })
            })
            .collect()
    }

    /// Row `row` with every cell present.
    pub fn dense_row(&self, row: usize) -> Result<Vec<f64>, CausalError> {
        self.data
            .iter()
            .zip(&self.columns)
            .map(|(column, name)| {
                column[row].ok_or_else(|| CausalError::MissingValue {
                    column: name.clone(),
                    date: self.index[row],
                })
            })
            .collect()
    }

    /// A new panel with only the named columns, in the order given.
    pub fn select(&self, names: &[String]) -> Result<Panel, CausalError> {
        let mut data = Vec::with_capacity(names.len());
        for name in names {
            let column = self.column(name).ok_or_else(|| CausalError::InvalidPanel {
                reason: format!("no column {name}"),
            })?;
            data.push(column.to_vec());
        }
        Panel::new(self.index.clone(), names.to_vec(), data)
    }

    /// Restrict to the given dates. Every date must be present in the index.
    pub fn restrict_to(&self, dates: &[NaiveDate]) -> Result<Panel, CausalError> {
        let positions: BTreeMap<NaiveDate, usize> = self
            .index
            .iter()
            .enumerate()
            .map(|(i, d)| (*d, i))
            .collect();
        let rows = dates
            .iter()
            .map(|d| {
                positions
                    .get(d)
                    .copied()
                    .ok_or_else(|| CausalError::InvalidPanel {
                        reason: format!("date {d} not in index"),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.take_rows(&rows))
    }

    fn take_rows(&self, rows: &[usize]) -> Panel {
        Panel {
            index: rows.iter().map(|&r| self.index[r]).collect(),
            columns: self.columns.clone(),
            data: self
                .data
                .iter()
                .map(|column| rows.iter().map(|&r| column[r]).collect())
                .collect(),
        }
    }

    /// Drop every row that has at least one missing cell.
    pub fn drop_incomplete_rows(&self) -> Panel {
        let rows: Vec<usize> = (0..self.len())
            .filter(|&r| self.data.iter().all(|column| column[r].is_some()))
            .collect();
        self.take_rows(&rows)
    }

    /// Carry the last present value forward over gaps. Leading gaps stay missing.
    pub fn forward_fill(&self) -> Panel {
        let data = self
            .data
            .iter()
            .map(|column| {
                let mut last = None;
                column
                    .iter()
                    .map(|v| {
                        if v.is_some() {
                            last = *v;
                        }
                        last
                    })
                    .collect()
            })
            .collect();
        Panel {
            index: self.index.clone(),
            columns: self.columns.clone(),
            data,
        }
    }

    /// Replace the named columns by their first difference. The first row of a
    /// differenced column becomes missing.
    pub fn difference_columns(&self, names: &[String]) -> Panel {
        let data = self
            .columns
            .iter()
            .zip(&self.data)
            .map(|(name, column)| {
                if !names.contains(name) {
                    return column.clone();
                }
                let mut out = Vec::with_capacity(column.len());
                out.push(None);
                for pair in column.windows(2) {
                    out.push(match (pair[0], pair[1]) {
                        (Some(prev), Some(curr)) => Some(curr - prev),
                        _ => None,
                    });
                }
                out.truncate(column.len());
                out
            })
            .collect();
        Panel {
            index: self.index.clone(),
            columns: self.columns.clone(),
            data,
        }
    }

    /// Rename a single column.
    pub fn rename(&self, from: &str, to: &str) -> Result<Panel, CausalError> {
        let position = self
            .column_position(from)
            .ok_or_else(|| CausalError::InvalidPanel {
                reason: format!("no column {from}"),
            })?;
        let mut columns = self.columns.clone();
        columns[position] = to.to_string();
        Panel::new(self.index.clone(), columns, self.data.clone())
    }

    /// Place the columns of `other` to the right of this panel's columns.
    /// Both panels must share the exact same index.
    pub fn join(&self, other: &Panel) -> Result<Panel, CausalError> {
        if self.index != other.index {
            return Err(CausalError::InvalidPanel {
                reason: "cannot join panels with different indices".into(),
            });
        }
        let mut columns = self.columns.clone();
        columns.extend(other.columns.iter().cloned());
        let mut data = self.data.clone();
        data.extend(other.data.iter().cloned());
        Panel::new(self.index.clone(), columns, data)
    }
}
