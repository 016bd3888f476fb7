//! Log returns from price panels.

use crate::domain::error::CausalError;
use crate::domain::panel::Panel;

/// ln(p[t] / p[t-1]) per column.
///
/// A return is defined only where both prices are strictly positive. Undefined
/// returns are forward-filled from the previous defined return; rows that still
/// have a gap (the first row, or a column whose first prices are unusable) are
/// dropped.
pub fn log_returns(prices: &Panel) -> Result<Panel, CausalError> {
    if prices.is_empty() {
        return Err(CausalError::InvalidPanel {
            reason: "empty price panel".into(),
        });
    }

    let data = (0..prices.width())
        .map(|c| {
            let column = prices.column_at(c);
            let mut out = Vec::with_capacity(column.len());
            out.push(None);
            for pair in column.windows(2) {
                out.push(match (pair[0], pair[1]) {
                    (Some(prev), Some(curr)) if prev > 0.0 && curr > 0.0 => {
                        Some((curr / prev).ln())
                    }
                    _ => None,
                });
            }
            out.truncate(column.len());
            out
        })
        .collect();

    let returns = Panel::new(prices.index().to_vec(), prices.columns().to_vec(), data)?
        .forward_fill()
        .drop_incomplete_rows();

    if returns.is_empty() {
        return Err(CausalError::InvalidPanel {
            reason: "log returns left no complete rows".into(),
        });
    }
    Ok(returns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn computes_log_differences() {
        let prices = Panel::from_values(
            vec![d(1), d(2), d(3)],
            vec!["A".into()],
            vec![vec![100.0, 110.0, 99.0]],
        )
        .unwrap();
        let returns = log_returns(&prices).unwrap();

        assert_eq!(returns.index(), &[d(2), d(3)]);
        let a = returns.dense_column("A").unwrap();
        assert_relative_eq!(a[0], (110.0f64 / 100.0).ln(), epsilon = 1e-12);
        assert_relative_eq!(a[1], (99.0f64 / 110.0).ln(), epsilon = 1e-12);
    }

    #[test]
    fn non_positive_price_is_forward_filled() {
        let prices = Panel::from_values(
            vec![d(1), d(2), d(3), d(4)],
            vec!["A".into()],
            vec![vec![100.0, 110.0, 0.0, 121.0]],
        )
        .unwrap();
        let returns = log_returns(&prices).unwrap();
        let a = returns.dense_column("A").unwrap();

        // 0.0 makes both the return into d3 and out of it undefined.
        assert_eq!(a.len(), 3);
        assert_relative_eq!(a[1], a[0], epsilon = 1e-12);
        assert_relative_eq!(a[2], a[0], epsilon = 1e-12);
    }

    #[test]
    fn leading_undefined_returns_are_dropped() {
        let prices = Panel::from_values(
            vec![d(1), d(2), d(3), d(4)],
            vec!["A".into(), "B".into()],
            vec![vec![-1.0, 100.0, 101.0, 102.0], vec![50.0, 51.0, 52.0, 53.0]],
        )
        .unwrap();
        let returns = log_returns(&prices).unwrap();
        assert_eq!(returns.index(), &[d(3), d(4)]);
    }

    #[test]
    fn empty_panel_fails() {
        assert!(matches!(
            log_returns(&Panel::empty()),
            Err(CausalError::InvalidPanel { .. })
        ));
    }
}
