use std::sync::LazyLock;

use regex::Regex;

use super::keywords::KeywordMatcher;
use super::types::{CandidateParagraph, ContextTag, TextUnit};
use super::ExtractionError;
use crate::config::EngineConfig;

/// Plain decimal, currency-prefixed figure, or percentage.
static NUMERIC_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\s?\d[\d,]*(?:\.\d+)?|\d[\d,]*(?:\.\d+)?\s?%|\b\d[\d,]*(?:\.\d+)?\b")
        .expect("Invalid numeric token regex")
});

/// Unit-price phrasing ("per bitcoin", "average price").
static PRICING_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bper\s+\w+|\baverage\s+(?:purchase\s+)?price\b")
        .expect("Invalid pricing regex")
});

/// Splits documents into candidate paragraphs by keyword containment.
pub struct ParagraphSelector {
    asset: KeywordMatcher,
    action: KeywordMatcher,
    cumulative: KeywordMatcher,
    min_len: usize,
}

impl ParagraphSelector {
    pub fn new(config: &EngineConfig) -> Result<Self, ExtractionError> {
        Ok(Self {
            asset: KeywordMatcher::new(&config.keywords.asset_terms)?,
            action: KeywordMatcher::new(&config.keywords.action_terms)?,
            cumulative: KeywordMatcher::new(&config.keywords.cumulative_terms)?,
            min_len: config.selector.min_paragraph_len,
        })
    }

    /// Units that carry an asset keyword and a numeric token, in document order.
    pub fn select(&self, units: &[TextUnit]) -> Vec<CandidateParagraph> {
        units
            .iter()
            .enumerate()
            .filter(|(_, u)| u.text.chars().count() >= self.min_len)
            .filter(|(_, u)| self.asset.is_match(&u.text))
            .filter_map(|(index, unit)| {
                let numeric_tokens = numeric_tokens(&unit.text);
                if numeric_tokens.is_empty() {
                    return None;
                }
                Some(CandidateParagraph {
                    index,
                    text: unit.text.clone(),
                    kind: unit.kind,
                    context: self.context_tag(&unit.text),
                    numeric_tokens,
                })
            })
            .collect()
    }

    /// Coarser filter for the model fallback: asset keyword only, no
    /// length or numeric requirement. Joined and capped at `max_chars`.
    pub fn relevant_text(&self, units: &[TextUnit], max_chars: usize) -> String {
        let mut out = String::new();
        for unit in units.iter().filter(|u| self.asset.is_match(&u.text)) {
            let needed = unit.text.len() + if out.is_empty() { 0 } else { 2 };
            if out.len() + needed > max_chars {
                let remaining = max_chars.saturating_sub(out.len() + 2);
                if remaining > 0 {
                    if !out.is_empty() {
                        out.push_str("\n\n");
                    }
                    out.push_str(truncate_at_char_boundary(&unit.text, remaining));
                }
                break;
            }
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(&unit.text);
        }
        out
    }

    fn context_tag(&self, text: &str) -> ContextTag {
        if self.cumulative.is_match(text) {
            ContextTag::Cumulative
        } else if self.action.is_match(text) {
            ContextTag::Transaction
        } else if PRICING_HINT.is_match(text) {
            ContextTag::Pricing
        } else {
            ContextTag::Unknown
        }
    }
}

/// All numeric tokens in the text, as written.
pub fn numeric_tokens(text: &str) -> Vec<String> {
    NUMERIC_TOKEN
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

/// Parse "21,454" / "250.0" into a float.
pub fn parse_number(token: &str) -> Option<f64> {
    let cleaned: String = token
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::types::UnitKind;

    fn unit(text: &str) -> TextUnit {
        TextUnit {
            text: text.to_string(),
            kind: UnitKind::Paragraph,
        }
    }

    fn selector() -> ParagraphSelector {
        ParagraphSelector::new(&EngineConfig::default()).unwrap()
    }

    #[test]
    fn selects_asset_paragraph_with_numbers() {
        let units = vec![
            unit("On August 11, 2020, the Company announced that it has purchased 21,454 bitcoins."),
            unit("The Company's revenues for the quarter were $120.1 million, up 4% year over year."),
        ];
        let candidates = selector().select(&units);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].index, 0);
        assert_eq!(candidates[0].context, ContextTag::Transaction);
        assert!(candidates[0].numeric_tokens.contains(&"21,454".to_string()));
    }

    #[test]
    fn short_units_discarded() {
        let candidates = selector().select(&[unit("Bought 5 bitcoins.")]);
        assert!(candidates.is_empty());
    }

    #[test]
    fn units_without_numbers_discarded() {
        let candidates = selector().select(&[unit(
            "The Company believes bitcoin is an attractive store of value over the long term.",
        )]);
        assert!(candidates.is_empty());
    }

    #[test]
    fn cumulative_tag_takes_precedence() {
        let candidates = selector().select(&[unit(
            "During the period between July 1, 2021 and August 23, 2021, the Company purchased approximately 3,907 bitcoins.",
        )]);
        assert_eq!(candidates[0].context, ContextTag::Cumulative);
    }

    #[test]
    fn pricing_tag_for_price_only_text() {
        let candidates = selector().select(&[unit(
            "The average price of the Company's bitcoin was approximately $29,817 per bitcoin at period end.",
        )]);
        assert_eq!(candidates[0].context, ContextTag::Pricing);
    }

    #[test]
    fn numeric_tokens_cover_currency_and_percent() {
        let tokens = numeric_tokens("paid $250.0 million, a 12.5% premium, for 21,454 units");
        assert_eq!(tokens, vec!["$250.0", "12.5%", "21,454"]);
    }

    #[test]
    fn parse_number_strips_grouping() {
        assert_eq!(parse_number("21,454"), Some(21454.0));
        assert_eq!(parse_number("$250.0"), Some(250.0));
        assert_eq!(parse_number("abc"), None);
    }

    #[test]
    fn relevant_text_is_capped() {
        let units = vec![
            unit("bitcoin one"),
            unit("unrelated text"),
            unit("bitcoin two"),
            unit("bitcoin three is much longer than the cap allows"),
        ];
        let text = selector().relevant_text(&units, 30);
        assert!(text.starts_with("bitcoin one\n\nbitcoin two"));
        assert!(!text.contains("unrelated"));
        assert!(text.len() <= 30);
    }
}
