//! Statement classification for candidate paragraphs.
//!
//! Rules apply in a fixed order and the first match wins:
//! 1. financing vocabulary (sentence-scoped re-check)
//! 2. forward-looking intent
//! 3. date-range markers (cumulative totals)
//! 4. holdings language without a purchase verb
//! 5. single "On <date>" anchor with a completed-action verb
//!
//! Exclusions (1-2) always beat inclusions (3-5).

use super::dates::{count_on_dates, find_on_date};
use super::keywords::{split_sentences, KeywordMatcher};
use super::types::{CandidateParagraph, ClassificationLabel};
use super::ExtractionError;
use crate::config::EngineConfig;

/// Label plus the text downstream stages should read.
///
/// `scoped_text` has financing sentences removed when rule 1 let the
/// paragraph through on the strength of a different sentence.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: ClassificationLabel,
    pub scoped_text: String,
    pub reason: &'static str,
}

pub struct StatementClassifier {
    asset: KeywordMatcher,
    action: KeywordMatcher,
    financing: KeywordMatcher,
    intent: KeywordMatcher,
    cumulative: KeywordMatcher,
    holdings: KeywordMatcher,
}

impl StatementClassifier {
    pub fn new(config: &EngineConfig) -> Result<Self, ExtractionError> {
        let k = &config.keywords;
        Ok(Self {
            asset: KeywordMatcher::new(&k.asset_terms)?,
            action: KeywordMatcher::new(&k.action_terms)?,
            financing: KeywordMatcher::new(&k.financing_terms)?,
            intent: KeywordMatcher::new(&k.intent_terms)?,
            cumulative: KeywordMatcher::new(&k.cumulative_terms)?,
            holdings: KeywordMatcher::new(&k.holdings_terms)?,
        })
    }

    pub fn classify(&self, candidate: &CandidateParagraph) -> Classification {
        self.classify_text(&candidate.text)
    }

    pub fn classify_text(&self, text: &str) -> Classification {
        // Rule 1: financing, re-checked per sentence.
        let scoped_text = if self.financing.is_match(text) {
            match self.strip_financing_sentences(text) {
                Some(kept) => kept,
                None => return label(ClassificationLabel::FinancingActivity, text, "financing"),
            }
        } else {
            text.to_string()
        };
        let text = scoped_text.as_str();

        // Rule 2
        if self.intent.is_match(text) {
            return label(ClassificationLabel::FutureIntent, text, "future intent");
        }

        // Rule 3
        if self.cumulative.is_match(text) {
            return label(ClassificationLabel::CumulativeTotal, text, "date range");
        }

        let has_action = self.action.is_match(text);

        // Rule 4
        if self.holdings.is_match(text) && !has_action {
            return label(ClassificationLabel::HoldingsSnapshot, text, "holdings");
        }

        // Rule 5
        if has_action && count_on_dates(text) == 1 && find_on_date(text).is_some() {
            return label(ClassificationLabel::IndividualTransaction, text, "dated action");
        }

        label(ClassificationLabel::Unclassified, text, "no rule matched")
    }

    /// Drop sentences that carry financing vocabulary without a purchase
    /// verb and asset term of their own. Returns `None` when nothing left
    /// still describes a purchase of the asset.
    fn strip_financing_sentences(&self, text: &str) -> Option<String> {
        let kept: Vec<&str> = split_sentences(text)
            .into_iter()
            .filter(|s| {
                !self.financing.is_match(s) || (self.action.is_match(s) && self.asset.is_match(s))
            })
            .collect();
        let survives = kept
            .iter()
            .any(|s| self.action.is_match(s) && self.asset.is_match(s));
        survives.then(|| kept.join(" "))
    }
}

fn label(label: ClassificationLabel, text: &str, reason: &'static str) -> Classification {
    Classification {
        label,
        scoped_text: text.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> ClassificationLabel {
        StatementClassifier::new(&EngineConfig::default())
            .unwrap()
            .classify_text(text)
            .label
    }

    #[test]
    fn dated_purchase_is_individual() {
        assert_eq!(
            classify("On August 11, 2020, the Company announced that it has purchased 21,454 bitcoins at an aggregate purchase price of $250.0 million."),
            ClassificationLabel::IndividualTransaction
        );
    }

    #[test]
    fn period_total_is_cumulative() {
        assert_eq!(
            classify("During the period between July 1, 2021 and August 23, 2021, the Company purchased approximately 3,907 bitcoins for approximately $177.0 million."),
            ClassificationLabel::CumulativeTotal
        );
    }

    #[test]
    fn range_marker_beats_single_date() {
        assert_eq!(
            classify("On August 24, 2021, the Company announced that during the period between July 1, 2021 and August 23, 2021, it purchased approximately 3,907 bitcoins."),
            ClassificationLabel::CumulativeTotal
        );
        assert_eq!(
            classify("On October 1, 2021, the Company disclosed it purchased 5,050 bitcoins during the quarter."),
            ClassificationLabel::CumulativeTotal
        );
    }

    #[test]
    fn note_offering_is_financing() {
        assert_eq!(
            classify("On February 19, 2021, the Company completed its offering of $1.05 billion aggregate principal amount of 0% Convertible Senior Notes due 2027."),
            ClassificationLabel::FinancingActivity
        );
    }

    #[test]
    fn proceeds_to_acquire_bitcoin_excluded() {
        let label = classify("The Company issued $500 million aggregate principal amount of Convertible Senior Notes due 2025. The net proceeds will be used to acquire additional bitcoin.");
        assert!(matches!(
            label,
            ClassificationLabel::FinancingActivity | ClassificationLabel::FutureIntent
        ));
    }

    #[test]
    fn purchase_funded_by_notes_in_same_sentence_accepted() {
        assert_eq!(
            classify("On February 24, 2021, the Company purchased 19,452 bitcoins for approximately $1.026 billion using proceeds from its convertible notes offering."),
            ClassificationLabel::IndividualTransaction
        );
    }

    #[test]
    fn unrelated_debt_sentence_does_not_exclude_purchase() {
        let classifier = StatementClassifier::new(&EngineConfig::default()).unwrap();
        let result = classifier.classify_text(
            "On December 4, 2020, the Company purchased 2,574 bitcoins for $50.0 million. Separately, the Company entered into a term loan with a bank.",
        );
        assert_eq!(result.label, ClassificationLabel::IndividualTransaction);
        assert!(!result.scoped_text.contains("term loan"));
    }

    #[test]
    fn intent_language_excluded() {
        assert_eq!(
            classify("On March 1, 2021, the Company stated that it intends to purchase additional bitcoin worth $100 million."),
            ClassificationLabel::FutureIntent
        );
    }

    #[test]
    fn holdings_without_verb_is_snapshot() {
        assert_eq!(
            classify("As of September 13, 2021, the Company held approximately 114,042 bitcoins."),
            ClassificationLabel::HoldingsSnapshot
        );
    }

    #[test]
    fn holdings_with_purchase_still_individual() {
        assert_eq!(
            classify("On December 21, 2020, the Company purchased 29,646 bitcoins for $650.0 million. As of December 21, 2020, the Company holds 70,470 bitcoins."),
            ClassificationLabel::IndividualTransaction
        );
    }

    #[test]
    fn undated_action_unclassified() {
        assert_eq!(
            classify("The Company purchased 1,000 bitcoins for $10 million in cash at some point."),
            ClassificationLabel::Unclassified
        );
    }
}
