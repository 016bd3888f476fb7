//! Frequency alignment of equity and macro indicator panels.
//!
//! Each series is resampled onto a common frequency (last observation per
//! bucket), gaps are forward-filled, leading gaps dropped, and every series is
//! then restricted to the intersection of the resulting indices.

use crate::domain::error::CausalError;
use crate::domain::panel::Panel;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Resampling period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Frequency {
    #[default]
    BusinessDay,
    Daily,
    /// Weeks ending on Sunday.
    Weekly,
    MonthEnd,
}

impl Frequency {
    /// The bucket label a date falls into.
    pub fn bucket(self, date: NaiveDate) -> NaiveDate {
        match self {
            Frequency::Daily => date,
            Frequency::BusinessDay => match date.weekday() {
                Weekday::Sat => date - Duration::days(1),
                Weekday::Sun => date - Duration::days(2),
                _ => date,
            },
            Frequency::Weekly => {
                let offset = 6 - date.weekday().num_days_from_monday() as i64;
                date + Duration::days(offset)
            }
            Frequency::MonthEnd => month_end(date),
        }
    }

    /// Buckets per calendar year, used to annualise per-period statistics.
    pub fn periods_per_year(self) -> f64 {
        match self {
            Frequency::BusinessDay => 252.0,
            Frequency::Daily => 365.0,
            Frequency::Weekly => 52.0,
            Frequency::MonthEnd => 12.0,
        }
    }

    /// The bucket label following `bucket`.
    pub fn next(self, bucket: NaiveDate) -> NaiveDate {
        match self {
            Frequency::Daily => bucket + Duration::days(1),
            Frequency::BusinessDay => match bucket.weekday() {
                Weekday::Fri => bucket + Duration::days(3),
                Weekday::Sat => bucket + Duration::days(2),
                _ => bucket + Duration::days(1),
            },
            Frequency::Weekly => bucket + Duration::days(7),
            Frequency::MonthEnd => month_end(bucket + Duration::days(1)),
        }
    }
}

fn month_end(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(date)
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "B" => Ok(Frequency::BusinessDay),
            "D" => Ok(Frequency::Daily),
            "W" => Ok(Frequency::Weekly),
            "M" => Ok(Frequency::MonthEnd),
            other => Err(format!("unknown frequency '{other}' (expected B, D, W or M)")),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Frequency::BusinessDay => "B",
            Frequency::Daily => "D",
            Frequency::Weekly => "W",
            Frequency::MonthEnd => "M",
        };
        f.write_str(code)
    }
}

/// Resample to `frequency`, keeping the last present observation per bucket
/// and forward-filling empty buckets.
pub fn resample(panel: &Panel, frequency: Frequency) -> Result<Panel, CausalError> {
    let (Some(first), Some(last)) = (panel.index().first(), panel.index().last()) else {
        return Ok(panel.clone());
    };

    let mut buckets = Vec::new();
    let end = frequency.bucket(*last);
    let mut bucket = frequency.bucket(*first);
    while bucket <= end {
        buckets.push(bucket);
        bucket = frequency.next(bucket);
    }
    let position: BTreeMap<NaiveDate, usize> =
        buckets.iter().enumerate().map(|(i, b)| (*b, i)).collect();

    let mut data = vec![vec![None; buckets.len()]; panel.width()];
    for (row, date) in panel.index().iter().enumerate() {
        let bucket = frequency.bucket(*date);
        let slot = *position.get(&bucket).ok_or_else(|| CausalError::Alignment {
            reason: format!("date {date} falls outside the resampled range"),
        })?;
        for (c, column) in data.iter_mut().enumerate() {
            if let Some(v) = panel.value(row, c) {
                column[slot] = Some(v);
            }
        }
    }

    Ok(Panel::new(buckets, panel.columns().to_vec(), data)?.forward_fill())
}

/// Equity and indicator panels on one shared index.
#[derive(Debug, Clone, PartialEq)]
pub struct Aligned {
    pub equity: Panel,
    pub indicators: BTreeMap<String, Panel>,
}

impl Aligned {
    pub fn index(&self) -> &[NaiveDate] {
        self.equity.index()
    }

    /// Equity columns followed by the first column of each indicator, named
    /// after the indicator.
    pub fn merged(&self) -> Result<Panel, CausalError> {
        let mut merged = self.equity.clone();
        for (name, panel) in &self.indicators {
            let first = panel.columns().first().ok_or_else(|| CausalError::Alignment {
                reason: format!("indicator {name} has no columns"),
            })?;
            let column = panel.select(std::slice::from_ref(first))?.rename(first, name)?;
            merged = merged.join(&column)?;
        }
        Ok(merged)
    }
}

pub fn align(
    equity: &Panel,
    indicators: &BTreeMap<String, Panel>,
    frequency: Frequency,
) -> Result<Aligned, CausalError> {
    if equity.is_empty() {
        return Err(CausalError::Alignment {
            reason: "empty equity panel".into(),
        });
    }
    if indicators.is_empty() {
        return Err(CausalError::Alignment {
            reason: "no indicator series provided".into(),
        });
    }
    if let Some((name, _)) = indicators.iter().find(|(_, p)| p.is_empty()) {
        return Err(CausalError::Alignment {
            reason: format!("indicator {name} is empty"),
        });
    }

    let equity = resample(equity, frequency)?.drop_incomplete_rows();
    let resampled = indicators
        .iter()
        .map(|(name, panel)| Ok((name.clone(), resample(panel, frequency)?.drop_incomplete_rows())))
        .collect::<Result<BTreeMap<_, _>, CausalError>>()?;

    let mut common: BTreeSet<NaiveDate> = equity.index().iter().copied().collect();
    for panel in resampled.values() {
        let dates: BTreeSet<NaiveDate> = panel.index().iter().copied().collect();
        common = common.intersection(&dates).copied().collect();
    }
    if common.is_empty() {
        return Err(CausalError::Alignment {
            reason: "no common dates between equity and indicators".into(),
        });
    }
    let common: Vec<NaiveDate> = common.into_iter().collect();

    Ok(Aligned {
        equity: equity.restrict_to(&common)?,
        indicators: resampled
            .iter()
            .map(|(name, panel)| Ok((name.clone(), panel.restrict_to(&common)?)))
            .collect::<Result<_, CausalError>>()?,
    })
}
