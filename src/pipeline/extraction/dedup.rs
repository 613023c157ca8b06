//! Reconcile records from the pattern and model passes.
//!
//! Two records are the same event when they share either fingerprint:
//! (rounded asset amount, rounded fiat amount) or, when both are dated,
//! (date, rounded asset amount). The higher-confidence record is kept;
//! ties go to whichever was inserted first, so callers insert pattern
//! records before model records.

use chrono::NaiveDate;

use super::types::{ExtractedTransaction, SharesOutstandingRecord};

/// Asset amounts are compared to 1/100 of a unit.
const AMOUNT_SCALE: f64 = 100.0;

/// Fiat amounts are compared to the nearest thousand.
const FIAT_SCALE: f64 = 1_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    Amounts { amount: i64, fiat: i64 },
    Dated { date: NaiveDate, amount: i64 },
}

fn round_amount(v: f64) -> i64 {
    (v * AMOUNT_SCALE).round() as i64
}

fn round_fiat(v: f64) -> i64 {
    (v / FIAT_SCALE).round() as i64
}

/// All fingerprints a record can be matched on.
pub fn fingerprints(tx: &ExtractedTransaction) -> Vec<Fingerprint> {
    let mut keys = Vec::with_capacity(2);
    if let Some(amount) = tx.asset_amount {
        if let Some(fiat) = tx.fiat_amount {
            keys.push(Fingerprint::Amounts {
                amount: round_amount(amount),
                fiat: round_fiat(fiat),
            });
        }
        if let Some(date) = tx.date {
            keys.push(Fingerprint::Dated {
                date,
                amount: round_amount(amount),
            });
        }
    }
    keys
}

/// Merge records into a duplicate-free list ordered by date (undated last).
/// Returns the list and how many records were merged away.
pub fn merge_transactions(
    records: Vec<ExtractedTransaction>,
) -> (Vec<ExtractedTransaction>, usize) {
    let mut kept: Vec<(Vec<Fingerprint>, ExtractedTransaction)> = Vec::new();
    let mut merged = 0;

    for record in records {
        let keys = fingerprints(&record);
        let existing = kept
            .iter_mut()
            .find(|(kept_keys, _)| keys.iter().any(|k| kept_keys.contains(k)));
        match existing {
            Some((kept_keys, kept_record)) => {
                merged += 1;
                if record.confidence > kept_record.confidence {
                    *kept_keys = keys;
                    *kept_record = record;
                }
            }
            None => kept.push((keys, record)),
        }
    }

    let mut out: Vec<ExtractedTransaction> = kept.into_iter().map(|(_, r)| r).collect();
    out.sort_by_key(|r| (r.date.is_none(), r.date));
    (out, merged)
}

/// Keep the single highest-confidence share record; first seen wins ties.
pub fn best_shares(records: Vec<SharesOutstandingRecord>) -> Option<SharesOutstandingRecord> {
    records.into_iter().fold(None, |best, candidate| match best {
        Some(b) if b.confidence >= candidate.confidence => Some(b),
        _ => Some(candidate),
    })
}
