//! Shares-outstanding extraction.
//!
//! A simpler sibling of the transaction pipeline: units mentioning shares
//! outstanding are scanned number by number, each number's local window is
//! checked for "authorized" / "weighted average" style disqualifiers, and
//! the source (balance sheet, cover page, table, note) sets the confidence.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use super::confidence::score_shares;
use super::dates::{find_any_date, find_as_of_date};
use super::keywords::{split_clauses, KeywordMatcher};
use super::selector::parse_number;
use super::types::{ShareSource, SharesOutstandingRecord, TextUnit, UnitKind};
use super::validation::validate_shares;
use super::ExtractionError;
use crate::config::{BoundsConfig, EngineConfig};

/// "<n> [up to three words] shares [trailing words]"
static NUMBER_BEFORE_SHARES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?P<pre>(?:[a-z'-]+\s+){0,4})(?P<n>(?:\d{1,3}(?:,\d{3})+|\d+))\s+(?P<mid>(?:[a-z'-]+\s+){0,3}?)shares\b(?P<post>(?:\s+[a-z'-]+){0,6})",
    )
    .expect("Invalid shares regex pattern")
});

/// Table rows put the label first: "Shares outstanding 98,765,432".
static LABEL_BEFORE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?P<label>(?:common|preferred)?[a-z ,.'-]{0,40}?shares\s+(?:issued\s+and\s+)?outstanding)[^\d]{0,20}?(?P<n>(?:\d{1,3}(?:,\d{3})+|\d+))\b")
        .expect("Invalid shares regex pattern")
});

static COVER_PAGE_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bregistrant\b|\blatest\s+practicable\s+date\b|\bthere\s+were\b")
        .expect("Invalid shares regex pattern")
});

static BALANCE_SHEET_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bpar\s+value\b|\bstockholders'?\s+equity\b|\bshareholders'?\s+equity\b")
        .expect("Invalid shares regex pattern")
});

/// One share figure found in a unit.
#[derive(Debug, Clone, PartialEq)]
struct ShareMention {
    count: u64,
    preferred: bool,
    class_tagged: bool,
}

pub struct SharesExtractor {
    exclusion: KeywordMatcher,
    bounds: BoundsConfig,
}

impl SharesExtractor {
    pub fn new(config: &EngineConfig) -> Result<Self, ExtractionError> {
        Ok(Self {
            exclusion: KeywordMatcher::new(&config.keywords.share_exclusion_terms)?,
            bounds: config.bounds.clone(),
        })
    }

    /// Whether a unit is worth scanning at all.
    pub fn is_candidate(unit: &TextUnit) -> bool {
        let lower = unit.text.to_lowercase();
        lower.contains("share")
            && lower.contains("outstanding")
            && lower.chars().any(|c| c.is_ascii_digit())
    }

    /// Classify where a share-count unit came from.
    pub fn classify_source(unit: &TextUnit) -> ShareSource {
        if COVER_PAGE_HINT.is_match(&unit.text) {
            ShareSource::CoverPage
        } else if BALANCE_SHEET_HINT.is_match(&unit.text) {
            ShareSource::BalanceSheet
        } else if unit.kind == UnitKind::TableRow {
            ShareSource::Table
        } else {
            ShareSource::Note
        }
    }

    /// Every plausible record across the units, in document order.
    pub fn extract(
        &self,
        units: &[TextUnit],
        filing_date: NaiveDate,
    ) -> Vec<SharesOutstandingRecord> {
        units
            .iter()
            .filter(|u| Self::is_candidate(u))
            .filter_map(|u| self.extract_unit(u, filing_date))
            .collect()
    }

    fn extract_unit(
        &self,
        unit: &TextUnit,
        filing_date: NaiveDate,
    ) -> Option<SharesOutstandingRecord> {
        let mut mentions = Vec::new();
        let mut as_of = None;
        for clause in split_clauses(&unit.text) {
            if !clause.to_lowercase().contains("outstanding") {
                continue;
            }
            let found = self.mentions_in_clause(clause, unit.kind);
            if !found.is_empty() && as_of.is_none() {
                as_of = find_as_of_date(clause).or_else(|| find_any_date(clause));
            }
            mentions.extend(found);
        }
        if mentions.is_empty() {
            return None;
        }
        let as_of = as_of.or_else(|| find_as_of_date(&unit.text));

        let commons: Vec<&ShareMention> = mentions.iter().filter(|m| !m.preferred).collect();
        let common = if commons.len() > 1 && commons.iter().all(|m| m.class_tagged) {
            commons.iter().try_fold(0u64, |acc, m| acc.checked_add(m.count))?
        } else {
            commons.first()?.count
        };
        let preferred = mentions.iter().find(|m| m.preferred).map(|m| m.count);
        let total = common.checked_add(preferred.unwrap_or(0))?;
        let source = Self::classify_source(unit);

        let record = SharesOutstandingRecord {
            as_of: as_of.unwrap_or(filing_date),
            common,
            preferred,
            total,
            source,
            source_excerpt: unit.text.clone(),
            confidence: score_shares(source, as_of.is_some()),
        };

        match validate_shares(&record, &self.bounds) {
            Ok(()) => Some(record),
            Err(reason) => {
                tracing::debug!(%reason, source = source.as_str(), "Share candidate rejected");
                None
            }
        }
    }

    fn mentions_in_clause(&self, clause: &str, kind: UnitKind) -> Vec<ShareMention> {
        let mut mentions: Vec<ShareMention> = NUMBER_BEFORE_SHARES
            .captures_iter(clause)
            .filter_map(|caps| {
                let window = format!(
                    "{} {} shares{}",
                    caps.name("pre").map_or("", |m| m.as_str()),
                    caps.name("mid").map_or("", |m| m.as_str()),
                    caps.name("post").map_or("", |m| m.as_str()),
                );
                self.mention(&window, clause, caps.name("n")?.as_str())
            })
            .collect();

        if mentions.is_empty() && kind == UnitKind::TableRow {
            mentions = LABEL_BEFORE_NUMBER
                .captures_iter(clause)
                .filter_map(|caps| {
                    let label = caps.name("label")?.as_str();
                    self.mention(label, clause, caps.name("n")?.as_str())
                })
                .collect();
        }
        mentions
    }

    fn mention(&self, window: &str, clause: &str, number: &str) -> Option<ShareMention> {
        if self.exclusion.is_match(window) {
            return None;
        }
        // Larger figures are never a plausible count and would not fit u64.
        let count = parse_number(number)?;
        if !(0.0..=self.bounds.max_share_count).contains(&count) {
            tracing::debug!(count, "Share figure above plausibility band");
            return None;
        }
        let count = count as u64;
        let window_lower = window.to_lowercase();
        let clause_lower = clause.to_lowercase();
        Some(ShareMention {
            count,
            preferred: window_lower.contains("preferred")
                || (clause_lower.contains("preferred") && !clause_lower.contains("common")),
            class_tagged: window_lower.contains("class"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::confidence::share_source_bonus;

    fn unit(text: &str, kind: UnitKind) -> TextUnit {
        TextUnit {
            text: text.to_string(),
            kind,
        }
    }

    fn filing_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 15).unwrap()
    }

    fn extract(units: &[TextUnit]) -> Vec<SharesOutstandingRecord> {
        SharesExtractor::new(&EngineConfig::default())
            .unwrap()
            .extract(units, filing_date())
    }

    #[test]
    fn balance_sheet_fragment_skips_authorized() {
        let records = extract(&[unit(
            "Common stock, $0.001 par value; 500,000,000 shares authorized; 98,765,432 shares outstanding as of December 31, 2023",
            UnitKind::Paragraph,
        )]);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.common, 98_765_432);
        assert_eq!(r.total, 98_765_432);
        assert_eq!(r.preferred, None);
        assert_eq!(r.source, ShareSource::BalanceSheet);
        assert_eq!(r.as_of, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        assert!(r.confidence >= 0.70 + share_source_bonus(ShareSource::BalanceSheet) - 1e-6);
    }

    #[test]
    fn cover_page_classes_summed() {
        let records = extract(&[unit(
            "As of February 1, 2024, the registrant had 10,000,000 shares of Class A common stock and 2,000,000 shares of Class B common stock outstanding.",
            UnitKind::Paragraph,
        )]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].common, 12_000_000);
        assert_eq!(records[0].source, ShareSource::CoverPage);
        assert_eq!(records[0].as_of, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
    }

    #[test]
    fn weighted_average_excluded() {
        let records = extract(&[unit(
            "Basic earnings per share was computed using 91,000,000 weighted average shares outstanding during the year.",
            UnitKind::Paragraph,
        )]);
        assert!(records.is_empty());
    }

    #[test]
    fn preferred_counted_separately() {
        let records = extract(&[unit(
            "At year end there were 50,000,000 shares of common stock outstanding; 5,000,000 shares of preferred stock outstanding.",
            UnitKind::Paragraph,
        )]);
        assert_eq!(records[0].common, 50_000_000);
        assert_eq!(records[0].preferred, Some(5_000_000));
        assert_eq!(records[0].total, 55_000_000);
    }

    #[test]
    fn table_row_label_first() {
        let records = extract(&[unit("Common shares outstanding 98,765,432", UnitKind::TableRow)]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].common, 98_765_432);
        assert_eq!(records[0].source, ShareSource::Table);
        assert_eq!(records[0].as_of, filing_date());
    }

    #[test]
    fn implausibly_small_count_rejected() {
        let records = extract(&[unit(
            "The subsidiary had 100 shares outstanding, all held by the parent.",
            UnitKind::Paragraph,
        )]);
        assert!(records.is_empty());
    }

    #[test]
    fn oversized_figures_dropped_without_overflow() {
        let records = extract(&[
            unit(
                "99999999999999999999 shares of common stock outstanding; \
                 99999999999999999999 shares of preferred stock outstanding",
                UnitKind::Paragraph,
            ),
            unit(
                "The registrant had 99999999999999999999 shares of Class A common stock and \
                 99999999999999999999 shares of Class B common stock outstanding.",
                UnitKind::Paragraph,
            ),
        ]);
        assert!(records.is_empty());
    }

    #[test]
    fn oversized_preferred_ignored_common_kept() {
        let records = extract(&[unit(
            "At year end there were 50,000,000 shares of common stock outstanding; \
             99999999999999999999 shares of preferred stock outstanding.",
            UnitKind::Paragraph,
        )]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].common, 50_000_000);
        assert_eq!(records[0].preferred, None);
        assert_eq!(records[0].total, 50_000_000);
    }

    #[test]
    fn units_without_outstanding_ignored() {
        assert!(!SharesExtractor::is_candidate(&unit(
            "500,000,000 shares authorized",
            UnitKind::Paragraph
        )));
    }
}
