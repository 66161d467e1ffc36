//! Decimal helpers for prices, lots and simple statistics.

use rust_decimal::prelude::MathematicalOps;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Round down to lot granularity.
pub fn round_down_to_lot(value: Decimal, lot_step: Decimal) -> Decimal {
    if lot_step == Decimal::ZERO {
        return value;
    }
    ((value / lot_step).floor() * lot_step).normalize()
}

/// Cap a lot size at `max_lot` and snap it down to `lot_step`.
///
/// Returns `None` when the result falls below `min_lot`; the caller decides
/// whether that is a validation failure or simply nothing to do.
pub fn clamp_lot(value: Decimal, min_lot: Decimal, max_lot: Decimal, lot_step: Decimal) -> Option<Decimal> {
    let capped = value.min(max_lot);
    let snapped = round_down_to_lot(capped, lot_step);
    if snapped < min_lot {
        None
    } else {
        Some(snapped)
    }
}

/// Safe division that returns zero if divisor is zero.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator == Decimal::ZERO {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

/// Calculate basis points (1 bp = 0.01%)
pub fn to_basis_points(rate: Decimal) -> Decimal {
    rate * dec!(10000)
}

pub fn mean(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    let sum: Decimal = values.iter().copied().sum();
    sum / Decimal::from(values.len())
}

/// Population standard deviation (divides by N).
pub fn population_std(values: &[Decimal]) -> Decimal {
    if values.len() < 2 {
        return Decimal::ZERO;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (*v - m) * (*v - m)).sum::<Decimal>()
        / Decimal::from(values.len());
    variance.sqrt().unwrap_or(Decimal::ZERO)
}
