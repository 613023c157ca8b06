use regex::Regex;

use super::ExtractionError;

/// Case-insensitive, word-bounded matcher over a configured term list.
///
/// Terms are matched longest-first so "disposed of" wins over "disposed".
/// An empty term list never matches.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    regex: Option<Regex>,
}

impl KeywordMatcher {
    pub fn new(terms: &[String]) -> Result<Self, ExtractionError> {
        let regex = match compile_alternation(terms) {
            Some(alt) => Some(
                Regex::new(&format!(r"(?i)\b(?:{alt})\b"))
                    .map_err(|e| ExtractionError::Config(format!("keyword pattern: {e}")))?,
            ),
            None => None,
        };
        Ok(Self { regex })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.as_ref().is_some_and(|r| r.is_match(text))
    }

    /// First matching term, lowercased.
    pub fn find(&self, text: &str) -> Option<String> {
        self.regex
            .as_ref()
            .and_then(|r| r.find(text))
            .map(|m| m.as_str().to_lowercase())
    }
}

/// Build an escaped `a|b|c` alternation, longest term first.
/// Returns `None` for an empty list.
pub fn compile_alternation(terms: &[String]) -> Option<String> {
    let mut sorted: Vec<&str> = terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    sorted.dedup();
    let alt = sorted
        .iter()
        .map(|t| regex::escape(t).replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|");
    Some(alt)
}

/// Split text into sentences on terminal punctuation followed by whitespace.
/// Decimal points ("$250.0", "$0.001") do not split.
pub fn split_sentences(text: &str) -> Vec<&str> {
    split_on(text, false)
}

/// Like `split_sentences`, but semicolons also end a clause.
pub fn split_clauses(text: &str) -> Vec<&str> {
    split_on(text, true)
}

fn split_on(text: &str, semicolons: bool) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if matches!(b, b'.' | b'!' | b'?') || (semicolons && b == b';') {
            let next_is_space = bytes.get(i + 1).map_or(true, |n| n.is_ascii_whitespace());
            if next_is_space && !ends_with_abbreviation(&text[start..i]) {
                let s = text[start..=i].trim();
                if !s.is_empty() {
                    sentences.push(s);
                }
                start = i + 1;
            }
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Abbreviations that end in a period without ending the sentence.
fn ends_with_abbreviation(prefix: &str) -> bool {
    const ABBREVIATIONS: &[&str] = &[
        "Inc", "Corp", "Co", "Ltd", "No", "Jan", "Feb", "Mar", "Apr", "Jun", "Jul", "Aug",
        "Sep", "Sept", "Oct", "Nov", "Dec", "approx", "U.S", "Mr", "Ms", "Dr",
    ];
    let last_word = prefix.rsplit(|c: char| c.is_whitespace()).next().unwrap_or("");
    ABBREVIATIONS.iter().any(|a| last_word.eq_ignore_ascii_case(a))
}
