//! causalfolio: portfolio construction driven by estimated causal effects of
//! macro indicators on asset returns.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
