//! Ordered numeric-extraction templates for individual transactions.
//!
//! Templates run most-specific first and the first match per candidate
//! wins. Each carries the confidence it assigns on a match.

use regex::{Captures, Regex};

use super::confidence::{detect_red_flags, score_transaction, thresholds};
use super::dates::find_on_date;
use super::keywords::{compile_alternation, KeywordMatcher};
use super::selector::parse_number;
use super::types::{ExtractedTransaction, ExtractionMethod, TransactionKind};
use super::validation::{derive_missing, validate_transaction, Rejection};
use super::ExtractionError;
use crate::config::{BoundsConfig, EngineConfig};

const NUM: &str = r"(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?";
const APPROX: &str = r"(?:(?:approximately|about|roughly|an\s+aggregate\s+of|a\s+total\s+of|an\s+additional)\s+)*";
const SCALE: &str = r"(?:\s*(?P<scale>million|billion))?";

/// Which fields a template captures directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    FullTriple,
    AmountPrice,
    AmountTotal,
    PriceTotal,
}

impl TemplateKind {
    pub fn base_confidence(&self) -> f32 {
        match self {
            TemplateKind::FullTriple => thresholds::EXPLICIT_TRIPLE,
            _ => thresholds::DERIVED,
        }
    }
}

struct TransactionTemplate {
    kind: TemplateKind,
    regex: Regex,
}

/// Raw numbers pulled out by a template, before derivation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawTriple {
    pub amount: Option<f64>,
    pub fiat: Option<f64>,
    pub price: Option<f64>,
}

/// Outcome of running the cascade on one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternOutcome {
    Extracted(ExtractedTransaction),
    /// A template matched but the record failed validation or scoring.
    Rejected { reason: Rejection, confidence: f32 },
    NoMatch,
}

pub struct PatternExtractor {
    templates: Vec<TransactionTemplate>,
    holdings_after: Regex,
    sale: KeywordMatcher,
    bounds: BoundsConfig,
}

impl PatternExtractor {
    pub fn new(config: &EngineConfig) -> Result<Self, ExtractionError> {
        let asset = compile_alternation(&config.keywords.asset_terms)
            .ok_or_else(|| ExtractionError::Config("asset_terms must not be empty".into()))?;
        let action = compile_alternation(&config.keywords.action_terms)
            .ok_or_else(|| ExtractionError::Config("action_terms must not be empty".into()))?;

        let lead = format!(r"(?i)\b(?:{action})\s+{APPROX}(?P<amount>{NUM})\s+(?:{asset})\b");
        let per_unit = format!(r"\s*(?:per|/|for\s+each)\s*(?:{asset}|unit|coin)\b");
        let sources = [
            (
                TemplateKind::FullTriple,
                format!(
                    r"{lead}[^$]{{0,80}}?\$\s?(?P<fiat>{NUM}){SCALE}[^$]{{0,120}}?\$\s?(?P<price>{NUM}){per_unit}"
                ),
            ),
            (
                TemplateKind::AmountPrice,
                format!(r"{lead}[^$]{{0,80}}?\$\s?(?P<price>{NUM}){per_unit}"),
            ),
            (
                TemplateKind::AmountTotal,
                format!(r"{lead}[^$]{{0,80}}?\$\s?(?P<fiat>{NUM}){SCALE}"),
            ),
            (
                TemplateKind::PriceTotal,
                format!(
                    r"(?i)\$\s?(?P<fiat>{NUM}){SCALE}[^$]{{0,120}}?\bprice\s+of\s+{APPROX}\$\s?(?P<price>{NUM}){per_unit}"
                ),
            ),
        ];

        let templates = sources
            .into_iter()
            .map(|(kind, pattern)| {
                Regex::new(&pattern)
                    .map(|regex| TransactionTemplate { kind, regex })
                    .map_err(|e| ExtractionError::Config(format!("{kind:?} template: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let holdings_after = Regex::new(&format!(
            r"(?i)\b(?:holds|held|holding|owns|owned)\s+(?:an\s+aggregate\s+of\s+)?{APPROX}(?P<holdings>{NUM})\s+(?:{asset})\b"
        ))
        .map_err(|e| ExtractionError::Config(format!("holdings template: {e}")))?;

        Ok(Self {
            templates,
            holdings_after,
            sale: KeywordMatcher::new(&config.keywords.sale_terms)?,
            bounds: config.bounds.clone(),
        })
    }

    /// First template hit, as raw numbers.
    pub fn match_raw(&self, text: &str) -> Option<(TemplateKind, RawTriple, String)> {
        self.templates.iter().find_map(|t| {
            t.regex.captures(text).map(|caps| {
                let excerpt = caps.get(0).map(|m| m.as_str().to_string()).unwrap_or_default();
                (t.kind, raw_triple(&caps), excerpt)
            })
        })
    }

    /// Run the cascade on an individual-transaction candidate.
    pub fn extract(&self, text: &str) -> PatternOutcome {
        let Some((kind, raw, excerpt)) = self.match_raw(text) else {
            return PatternOutcome::NoMatch;
        };

        let Some((amount, fiat, price)) = derive_missing(raw.amount, raw.fiat, raw.price) else {
            return PatternOutcome::Rejected {
                reason: Rejection::NonPositive,
                confidence: thresholds::FAILED,
            };
        };

        let mut tx = ExtractedTransaction {
            date: find_on_date(text),
            kind: if self.sale.is_match(&excerpt) {
                TransactionKind::Sale
            } else {
                TransactionKind::Purchase
            },
            asset_amount: Some(amount),
            fiat_amount: Some(fiat),
            unit_price: Some(price),
            holdings_after: self.find_holdings_after(text),
            source_excerpt: text.to_string(),
            method: ExtractionMethod::Pattern,
            confidence: kind.base_confidence(),
        };

        if let Err(reason) = validate_transaction(&tx, &self.bounds) {
            return PatternOutcome::Rejected {
                reason,
                confidence: thresholds::FAILED,
            };
        }

        let flags = detect_red_flags(&tx, &self.bounds);
        tx.confidence = score_transaction(kind.base_confidence(), &flags);
        if tx.confidence < thresholds::REJECT {
            return PatternOutcome::Rejected {
                reason: Rejection::LowConfidence(tx.confidence),
                confidence: tx.confidence,
            };
        }
        PatternOutcome::Extracted(tx)
    }

    fn find_holdings_after(&self, text: &str) -> Option<f64> {
        self.holdings_after
            .captures(text)
            .and_then(|c| c.name("holdings"))
            .and_then(|m| parse_number(m.as_str()))
    }
}

fn raw_triple(caps: &Captures) -> RawTriple {
    let multiplier = match caps.name("scale").map(|m| m.as_str().to_lowercase()) {
        Some(s) if s == "billion" => 1e9,
        Some(s) if s == "million" => 1e6,
        _ => 1.0,
    };
    let number = |name: &str| caps.name(name).and_then(|m| parse_number(m.as_str()));
    RawTriple {
        amount: number("amount"),
        fiat: number("fiat").map(|f| f * multiplier),
        price: number("price"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn extractor() -> PatternExtractor {
        PatternExtractor::new(&EngineConfig::default()).unwrap()
    }

    fn extracted(text: &str) -> ExtractedTransaction {
        match extractor().extract(text) {
            PatternOutcome::Extracted(tx) => tx,
            other => panic!("expected a record, got {other:?}"),
        }
    }

    #[test]
    fn amount_and_total_derives_price() {
        let tx = extracted("On August 11, 2020, the Company announced that it has purchased 21,454 bitcoins at an aggregate purchase price of $250.0 million.");
        assert_eq!(tx.asset_amount, Some(21454.0));
        assert_eq!(tx.fiat_amount, Some(250_000_000.0));
        assert!((tx.unit_price.unwrap() - 11652.79).abs() < 0.1);
        assert_eq!(tx.date, NaiveDate::from_ymd_opt(2020, 8, 11));
        assert_eq!(tx.confidence, thresholds::DERIVED);
        assert_eq!(tx.kind, TransactionKind::Purchase);
        assert_eq!(tx.method, ExtractionMethod::Pattern);
    }

    #[test]
    fn full_triple_has_highest_confidence() {
        let tx = extracted("On February 24, 2021, the Company purchased approximately 19,452 bitcoins for approximately $1.026 billion in cash, at an average price of approximately $52,765 per bitcoin.");
        assert_eq!(tx.asset_amount, Some(19452.0));
        assert_eq!(tx.fiat_amount, Some(1_026_000_000.0));
        assert_eq!(tx.unit_price, Some(52765.0));
        assert_eq!(tx.confidence, thresholds::EXPLICIT_TRIPLE);
    }

    #[test]
    fn amount_and_price_derives_total() {
        let tx = extracted("On May 13, 2021, the Company purchased 271 bitcoins at an average price of $55,387 per bitcoin.");
        assert_eq!(tx.asset_amount, Some(271.0));
        assert_eq!(tx.fiat_amount, Some(271.0 * 55387.0));
        assert_eq!(tx.confidence, thresholds::DERIVED);
    }

    #[test]
    fn price_and_total_derives_amount() {
        let tx = extracted("On June 21, 2021, the Company spent $489.0 million in cash to add to its treasury, at an average price of $37,617 per bitcoin.");
        assert!((tx.asset_amount.unwrap() - 489_000_000.0 / 37617.0).abs() < 1e-6);
        assert_eq!(tx.unit_price, Some(37617.0));
    }

    #[test]
    fn template_order_prefers_full_triple() {
        let (kind, raw, _) = extractor()
            .match_raw("purchased 100 bitcoins for $5.0 million at an average price of $50,000 per bitcoin")
            .unwrap();
        assert_eq!(kind, TemplateKind::FullTriple);
        assert_eq!(raw.fiat, Some(5_000_000.0));
    }

    #[test]
    fn sale_detected() {
        let tx = extracted("On December 22, 2022, the Company sold 704 bitcoins for approximately $11.8 million in cash.");
        assert_eq!(tx.kind, TransactionKind::Sale);
    }

    #[test]
    fn holdings_after_captured() {
        let tx = extracted("On December 21, 2020, the Company purchased approximately 29,646 bitcoins for approximately $650.0 million in cash. As of December 21, 2020, the Company holds an aggregate of approximately 70,470 bitcoins.");
        assert_eq!(tx.holdings_after, Some(70470.0));
    }

    #[test]
    fn implausible_price_rejected() {
        let outcome = extractor().extract("On May 1, 2021, the Company purchased 1,000 bitcoins for $5 in a promotional transfer.");
        assert!(matches!(
            outcome,
            PatternOutcome::Rejected {
                reason: Rejection::PriceOutOfBand(_),
                confidence,
            } if confidence == thresholds::FAILED
        ));
    }

    #[test]
    fn no_numbers_no_match() {
        assert_eq!(
            extractor().extract("On May 1, 2021, the Company purchased bitcoin."),
            PatternOutcome::NoMatch
        );
    }

    #[test]
    fn configured_asset_terms_drive_templates() {
        let mut config = EngineConfig::default();
        config.keywords.asset_terms = vec!["ether".into(), "eth".into()];
        let extractor = PatternExtractor::new(&config).unwrap();
        let outcome = extractor.extract("On March 3, 2024, the Company purchased 1,500 ETH for $5.1 million.");
        assert!(matches!(outcome, PatternOutcome::Extracted(_)));
        let outcome = extractor.extract("On March 3, 2024, the Company purchased 1,500 bitcoins for $5.1 million.");
        assert_eq!(outcome, PatternOutcome::NoMatch);
    }
}
