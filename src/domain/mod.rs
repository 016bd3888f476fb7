//! Core domain types and logic.

pub mod error;
pub mod panel;
pub mod returns;
pub mod align;
pub mod stationarity;
pub mod encoding;
pub mod forest;
pub mod estimator;
pub mod portfolio;
pub mod backtest;
pub mod metrics;
pub mod sample;
pub mod upload;
pub mod config;
pub mod config_validation;
pub mod pipeline;
