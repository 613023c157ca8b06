use super::types::{ExtractedTransaction, ShareSource};
use crate::config::BoundsConfig;

/// Confidence levels assigned at template-match time and used for gating.
pub mod thresholds {
    /// All three of amount, fiat and price stated explicitly.
    pub const EXPLICIT_TRIPLE: f32 = 0.95;

    /// Two values stated, the third derived.
    pub const DERIVED: f32 = 0.85;

    /// Records below this are dropped.
    pub const REJECT: f32 = 0.50;

    /// Assigned to a fragment that failed validation before it is dropped.
    pub const FAILED: f32 = 0.10;

    /// Ceiling for anything the external model returns.
    pub const MODEL_CAP: f32 = 0.80;

    /// Share-count base before the source bonus.
    pub const SHARES_BASE: f32 = 0.70;
}

/// Contextual warning signs that lower a pattern record's confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedFlag {
    /// Amount is at holdings scale, likely a running total.
    HoldingsScale,
    /// Stated amount × price disagrees with stated fiat by more than 5%.
    InconsistentTriple,
    /// No event date could be attached.
    Undated,
}

impl RedFlag {
    pub fn penalty(&self) -> f32 {
        match self {
            RedFlag::HoldingsScale => 0.30,
            RedFlag::InconsistentTriple => 0.15,
            RedFlag::Undated => 0.10,
        }
    }
}

/// Red flags present on a transaction record.
pub fn detect_red_flags(tx: &ExtractedTransaction, bounds: &BoundsConfig) -> Vec<RedFlag> {
    let mut flags = Vec::new();
    if tx
        .asset_amount
        .is_some_and(|a| a >= bounds.snapshot_amount_threshold)
    {
        flags.push(RedFlag::HoldingsScale);
    }
    if let (Some(a), Some(f), Some(p)) = (tx.asset_amount, tx.fiat_amount, tx.unit_price) {
        if f > 0.0 && ((a * p - f) / f).abs() > 0.05 {
            flags.push(RedFlag::InconsistentTriple);
        }
    }
    if tx.date.is_none() {
        flags.push(RedFlag::Undated);
    }
    flags
}

/// Apply red-flag penalties to a base confidence.
pub fn score_transaction(base: f32, flags: &[RedFlag]) -> f32 {
    let penalty: f32 = flags.iter().map(RedFlag::penalty).sum();
    (base - penalty).clamp(0.0, 1.0)
}

/// Bonus for where a share count was found. Balance-sheet figures are
/// the most reliable "outstanding" count.
pub fn share_source_bonus(source: ShareSource) -> f32 {
    match source {
        ShareSource::BalanceSheet => 0.20,
        ShareSource::CoverPage => 0.15,
        ShareSource::Table => 0.10,
        ShareSource::Note => 0.05,
    }
}

pub fn score_shares(source: ShareSource, dated: bool) -> f32 {
    let undated_penalty = if dated { 0.0 } else { 0.10 };
    (thresholds::SHARES_BASE + share_source_bonus(source) - undated_penalty).clamp(0.0, 1.0)
}

/// Model-reported confidence, clamped into [0, MODEL_CAP]. Missing or
/// non-finite values take the cap minus a margin.
pub fn model_confidence(reported: Option<f64>) -> f32 {
    match reported {
        Some(c) if c.is_finite() => (c as f32).clamp(0.0, thresholds::MODEL_CAP),
        _ => thresholds::MODEL_CAP - 0.10,
    }
}
