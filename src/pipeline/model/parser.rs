//! Tolerant parsing of the model's structured reply.
//!
//! The reply may wrap its JSON in prose or markdown fences, and numbers may
//! come back as strings ("$250.0 million", "21,454"). Records typed as
//! cumulative, or with fewer than two usable numbers, are skipped.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::ModelError;
use crate::pipeline::extraction::dates::parse_date_str;
use crate::pipeline::extraction::types::TransactionKind;

/// First number in a string, with a scale word before any later digit.
static SCALED_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?P<n>-?\d[\d,]*(?:\.\d+)?|-?\.\d+)(?:\D*?\b(?P<scale>million|billion)\b)?")
        .expect("valid scaled number regex")
});

/// One transaction as reported by the model, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelTransaction {
    pub asset_amount: Option<f64>,
    pub fiat_amount: Option<f64>,
    pub unit_price: Option<f64>,
    pub kind: TransactionKind,
    pub date: Option<NaiveDate>,
    pub confidence: Option<f64>,
    pub rationale: Option<String>,
    pub source_excerpt: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub transactions: Vec<ModelTransaction>,
    /// Records dropped as cumulative or incomplete.
    pub skipped: usize,
    pub analysis: Option<String>,
    pub reasoning: Option<String>,
    pub confidence: Option<f64>,
}

#[derive(Deserialize)]
struct RawReply {
    #[serde(default)]
    transactions: Vec<Value>,
    #[serde(default)]
    analysis: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    confidence: Option<Value>,
}

/// First balanced `{ ... }` in the text, skipping braces inside strings.
pub fn extract_first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a model reply into candidate transactions.
pub fn parse_model_reply(reply: &str) -> Result<ModelReply, ModelError> {
    let json = extract_first_json_object(reply).ok_or(ModelError::NoJsonFound)?;
    let raw: RawReply =
        serde_json::from_str(json).map_err(|e| ModelError::JsonParsing(e.to_string()))?;

    let mut parsed = ModelReply {
        analysis: raw.analysis,
        reasoning: raw.reasoning,
        confidence: raw.confidence.as_ref().and_then(lenient_number),
        ..Default::default()
    };

    for value in &raw.transactions {
        match parse_transaction(value) {
            Some(tx) => parsed.transactions.push(tx),
            None => parsed.skipped += 1,
        }
    }
    Ok(parsed)
}

fn parse_transaction(value: &Value) -> Option<ModelTransaction> {
    let obj = value.as_object()?;
    let text = |key: &str| obj.get(key).and_then(Value::as_str).map(str::trim);
    let number = |keys: &[&str]| keys.iter().find_map(|k| obj.get(*k).and_then(lenient_number));

    if text("type").is_some_and(|t| t.eq_ignore_ascii_case("cumulative")) {
        return None;
    }

    let tx = ModelTransaction {
        asset_amount: number(&["btc_amount", "asset_amount", "amount"]),
        fiat_amount: number(&["usd_amount", "fiat_amount", "total"]),
        unit_price: number(&["unit_price", "price", "price_per_unit"]),
        kind: match text("kind") {
            Some(k) if k.eq_ignore_ascii_case("sale") => TransactionKind::Sale,
            _ => TransactionKind::Purchase,
        },
        date: text("date").and_then(parse_date_str),
        confidence: obj.get("confidence").and_then(lenient_number),
        rationale: text("rationale").map(str::to_string),
        source_excerpt: text("source_excerpt").filter(|s| !s.is_empty()).map(str::to_string),
    };

    let present = [tx.asset_amount, tx.fiat_amount, tx.unit_price]
        .iter()
        .filter(|v| v.is_some())
        .count();
    (present >= 2).then_some(tx)
}

/// Accept JSON numbers, or strings like "$1,234.5 million".
pub fn lenient_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let caps = SCALED_NUMBER.captures(s)?;
            let multiplier = match caps.name("scale").map(|m| m.as_str().to_lowercase()) {
                Some(scale) if scale == "billion" => 1e9,
                Some(_) => 1e6,
                None => 1.0,
            };
            let digits = caps["n"].replace(',', "");
            digits.parse::<f64>().ok().map(|n| n * multiplier)
        }
        _ => None,
    };
    number.filter(|n| n.is_finite())
}
