//! Market and macro data access port.
//!
//! Implementations report failures as typed errors and never return an empty
//! panel as success: an answer with nothing in range is `CausalError::NoData`,
//! a failed retrieval is `CausalError::DataSource`, and content that cannot be
//! parsed is `CausalError::MalformedData`.

use crate::domain::error::CausalError;
use crate::domain::panel::Panel;
use chrono::NaiveDate;

pub trait DataPort {
    /// Closing prices, one column per ticker, within `[start_date, end_date]`.
    fn fetch_prices(
        &self,
        tickers: &[String],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Panel, CausalError>;

    /// A single-column panel for one indicator series.
    fn fetch_indicator(
        &self,
        name: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Panel, CausalError>;
}
