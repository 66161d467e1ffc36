//! Shared utilities.

pub mod decimal;

pub use decimal::{clamp_lot, mean, population_std, round_down_to_lot, safe_div, to_basis_points};
