use std::fmt;

use super::types::{ExtractedTransaction, SharesOutstandingRecord};
use crate::config::BoundsConfig;

/// Why a record was discarded. Only logged at debug and counted.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// Exactly one of asset amount / fiat amount present.
    HalfPair,
    NonPositive,
    PriceOutOfBand(f64),
    SharesOutOfBand(u64),
    TotalBelowParts,
    LowConfidence(f32),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::HalfPair => {
                write!(f, "asset and fiat amounts must both be present or both absent")
            }
            Rejection::NonPositive => write!(f, "amounts must be positive"),
            Rejection::PriceOutOfBand(p) => write!(f, "unit price {p} outside plausibility band"),
            Rejection::SharesOutOfBand(n) => write!(f, "share count {n} outside plausibility band"),
            Rejection::TotalBelowParts => write!(f, "total below common + preferred"),
            Rejection::LowConfidence(c) => write!(f, "confidence {c:.2} below threshold"),
        }
    }
}

/// Fill in the missing member of {amount, fiat, price} when two are known.
/// Returns `None` when fewer than two are usable.
pub fn derive_missing(
    amount: Option<f64>,
    fiat: Option<f64>,
    price: Option<f64>,
) -> Option<(f64, f64, f64)> {
    let positive = |v: Option<f64>| v.filter(|x| x.is_finite() && *x > 0.0);
    match (positive(amount), positive(fiat), positive(price)) {
        (Some(a), Some(f), Some(p)) => Some((a, f, p)),
        (Some(a), Some(f), None) => Some((a, f, f / a)),
        (Some(a), None, Some(p)) => Some((a, a * p, p)),
        (None, Some(f), Some(p)) => Some((f / p, f, p)),
        _ => None,
    }
}

/// Check transaction invariants against the configured bands.
pub fn validate_transaction(
    tx: &ExtractedTransaction,
    bounds: &BoundsConfig,
) -> Result<(), Rejection> {
    match (tx.asset_amount, tx.fiat_amount) {
        (Some(a), Some(f)) => {
            if !(a > 0.0 && f > 0.0) {
                return Err(Rejection::NonPositive);
            }
        }
        (None, None) => {}
        _ => return Err(Rejection::HalfPair),
    }
    if let Some(price) = tx.unit_price {
        if !(bounds.min_unit_price..=bounds.max_unit_price).contains(&price) {
            return Err(Rejection::PriceOutOfBand(price));
        }
    }
    Ok(())
}

/// Share counts outside the band are usually "authorized" or
/// "weighted average" figures parsed by mistake.
pub fn validate_shares(
    record: &SharesOutstandingRecord,
    bounds: &BoundsConfig,
) -> Result<(), Rejection> {
    let in_band = |n: u64| (bounds.min_share_count..=bounds.max_share_count).contains(&(n as f64));
    if !in_band(record.common) {
        return Err(Rejection::SharesOutOfBand(record.common));
    }
    if let Some(preferred) = record.preferred {
        if record.total < record.common.saturating_add(preferred) {
            return Err(Rejection::TotalBelowParts);
        }
    }
    if record.total < record.common {
        return Err(Rejection::TotalBelowParts);
    }
    Ok(())
}
