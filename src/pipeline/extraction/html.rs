//! Reduce raw filing bytes to an ordered list of text units.
//!
//! Paragraph boundaries, in order of preference: `<p>` elements, then table
//! rows / list items / divs, then blank-line splits of the whole body text.
//! Table rows are always emitted as their own units since balance-sheet share
//! counts live there.

use std::sync::LazyLock;

use regex::Regex;

use super::types::{TextUnit, UnitKind};
use super::ExtractionError;

/// Share of undecodable characters above which content is treated as binary.
const MAX_REPLACEMENT_RATIO: f64 = 0.05;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("Invalid html regex pattern")
}

static HTML_MARKER: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)<(?:!doctype\s+html|html|body|p|div|table|tr|td|span|font)\b"));
static NOISE_BLOCKS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        re(r"(?is)<!--.*?-->"),
        re(r"(?is)<script\b.*?</script\s*>"),
        re(r"(?is)<style\b.*?</style\s*>"),
        re(r"(?is)<head\b.*?</head\s*>"),
        re(r"(?is)<ix:header\b.*?</ix:header\s*>"),
    ]
});
static P_BLOCK: LazyLock<Regex> = LazyLock::new(|| re(r"(?is)<p\b[^>]*>(.*?)</p\s*>"));
static TR_BLOCK: LazyLock<Regex> = LazyLock::new(|| re(r"(?is)<tr\b[^>]*>(.*?)</tr\s*>"));
static LI_BLOCK: LazyLock<Regex> = LazyLock::new(|| re(r"(?is)<li\b[^>]*>(.*?)</li\s*>"));
static DIV_BLOCK: LazyLock<Regex> = LazyLock::new(|| re(r"(?is)<div\b[^>]*>(.*?)</div\s*>"));
static BLOCK_TAG: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)</?(?:p|div|tr|li|br|h[1-6]|table|section)\b[^>]*>"));
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| re(r"(?s)<[^>]*>"));
static NUMERIC_ENTITY: LazyLock<Regex> = LazyLock::new(|| re(r"&#([xX]?)([0-9a-fA-F]{1,6});"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| re(r"\s+"));
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| re(r"\n[ \t\r\u{a0}]*\n"));

/// Decode document bytes as text. Invalid UTF-8 is tolerated up to a
/// small ratio of replacement characters; beyond that the input is
/// treated as binary.
pub fn decode_content(bytes: &[u8]) -> Result<String, ExtractionError> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ExtractionError::EmptyDocument);
    }
    let nul_count = bytes.iter().filter(|&&b| b == 0).count();
    if nul_count * 100 > bytes.len() {
        return Err(ExtractionError::MalformedInput(
            "content contains binary data".into(),
        ));
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(s.to_string()),
        Err(_) => {
            let lossy = String::from_utf8_lossy(bytes);
            let total = lossy.chars().count().max(1);
            let replaced = lossy.chars().filter(|&c| c == char::REPLACEMENT_CHARACTER).count();
            if replaced as f64 / total as f64 > MAX_REPLACEMENT_RATIO {
                return Err(ExtractionError::MalformedInput(
                    "content is not valid UTF-8 text".into(),
                ));
            }
            Ok(lossy.into_owned())
        }
    }
}

pub fn is_html(text: &str) -> bool {
    HTML_MARKER.is_match(text)
}

/// Split a decoded document into text units.
pub fn text_units(text: &str) -> Result<Vec<TextUnit>, ExtractionError> {
    let units = if is_html(text) {
        html_units(text)
    } else {
        plain_units(text)
    };
    if units.is_empty() {
        return Err(ExtractionError::MalformedInput(
            "document contains no readable text".into(),
        ));
    }
    Ok(units)
}

fn html_units(html: &str) -> Vec<TextUnit> {
    let mut cleaned = html.to_string();
    for noise in NOISE_BLOCKS.iter() {
        cleaned = noise.replace_all(&cleaned, " ").into_owned();
    }

    let mut units = collect_blocks(&P_BLOCK, &cleaned, UnitKind::Paragraph);
    let rows = collect_blocks(&TR_BLOCK, &cleaned, UnitKind::TableRow);

    if units.is_empty() {
        units.extend(rows);
        units.extend(collect_blocks(&LI_BLOCK, &cleaned, UnitKind::ListItem));
        if units.is_empty() {
            units = collect_blocks(&DIV_BLOCK, &cleaned, UnitKind::Block);
        }
    } else {
        units.extend(rows);
    }

    if units.is_empty() {
        let with_breaks = BLOCK_TAG.replace_all(&cleaned, "\n\n");
        let stripped = ANY_TAG.replace_all(&with_breaks, " ");
        units = split_blank_lines(&decode_entities(&stripped), UnitKind::Block);
    }
    units
}

fn plain_units(text: &str) -> Vec<TextUnit> {
    split_blank_lines(text, UnitKind::PlainText)
}

fn collect_blocks(pattern: &Regex, html: &str, kind: UnitKind) -> Vec<TextUnit> {
    pattern
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| html_fragment_to_text(m.as_str()))
        .filter(|t| !t.is_empty())
        .map(|text| TextUnit { text, kind })
        .collect()
}

fn split_blank_lines(text: &str, kind: UnitKind) -> Vec<TextUnit> {
    let normalized = text.replace("\r\n", "\n");
    BLANK_LINES
        .split(&normalized)
        .map(collapse_whitespace)
        .filter(|t| !t.is_empty())
        .map(|text| TextUnit { text, kind })
        .collect()
}

/// Strip tags from an HTML fragment, decode entities, collapse whitespace.
pub fn html_fragment_to_text(fragment: &str) -> String {
    let stripped = ANY_TAG.replace_all(fragment, " ");
    collapse_whitespace(&decode_entities(&stripped))
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Decode the entities filings actually use, plus any numeric reference.
pub fn decode_entities(text: &str) -> String {
    let numeric = NUMERIC_ENTITY.replace_all(text, |caps: &regex::Captures| {
        let radix = if caps[1].is_empty() { 10 } else { 16 };
        u32::from_str_radix(&caps[2], radix)
            .ok()
            .and_then(char::from_u32)
            .map(normalize_char)
            .map(String::from)
            .unwrap_or_default()
    });
    numeric
        .replace("&nbsp;", " ")
        .replace("&rsquo;", "'")
        .replace("&lsquo;", "'")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&mdash;", "-")
        .replace("&ndash;", "-")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .chars()
        .map(normalize_char)
        .collect()
}

/// Fold typographic variants onto ASCII so downstream patterns stay simple.
fn normalize_char(c: char) -> char {
    match c {
        '\u{a0}' | '\u{2009}' | '\u{202f}' => ' ',
        '\u{2018}' | '\u{2019}' => '\'',
        '\u{201c}' | '\u{201d}' => '"',
        '\u{2013}' | '\u{2014}' => '-',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bytes_rejected() {
        assert!(matches!(decode_content(b""), Err(ExtractionError::EmptyDocument)));
        assert!(matches!(decode_content(b"  \n "), Err(ExtractionError::EmptyDocument)));
    }

    #[test]
    fn binary_bytes_rejected() {
        let bytes = [0u8, 159, 146, 150, 0, 0, 255, 254, 0, 1];
        assert!(matches!(
            decode_content(&bytes),
            Err(ExtractionError::MalformedInput(_))
        ));
    }

    #[test]
    fn mostly_valid_utf8_tolerated() {
        let mut bytes = b"The Company purchased bitcoin for cash in the ordinary course.".to_vec();
        bytes.push(0xff);
        let text = decode_content(&bytes).unwrap();
        assert!(text.contains("purchased bitcoin"));
    }

    #[test]
    fn plain_text_splits_on_blank_lines() {
        let units = text_units("First paragraph\nwraps here.\n\n  \nSecond paragraph.").unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].text, "First paragraph wraps here.");
        assert_eq!(units[0].kind, UnitKind::PlainText);
    }

    #[test]
    fn html_paragraphs_preferred() {
        let html = "<html><body><div><p>On August 11, 2020, the Company&#8217;s board</p>\
                    <p>approved&nbsp;the <b>purchase</b>.</p></div></body></html>";
        let units = text_units(html).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].text, "On August 11, 2020, the Company's board");
        assert_eq!(units[1].text, "approved the purchase .");
        assert!(units.iter().all(|u| u.kind == UnitKind::Paragraph));
    }

    #[test]
    fn table_rows_emitted_alongside_paragraphs() {
        let html = "<p>Balance sheet</p><table><tr><td>Common stock</td><td>98,765,432</td></tr></table>";
        let units = text_units(html).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[1].kind, UnitKind::TableRow);
        assert_eq!(units[1].text, "Common stock 98,765,432");
    }

    #[test]
    fn divs_used_without_paragraphs() {
        let html = "<html><body><div>First block text</div><div>Second block text</div></body></html>";
        let units = text_units(html).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].kind, UnitKind::Block);
    }

    #[test]
    fn script_style_and_comments_removed() {
        let html = "<html><head><title>x</title></head><body><script>var bitcoin = 1;</script>\
                    <style>p { color: red }</style><!-- bitcoin --><p>Visible text</p></body></html>";
        let units = text_units(html).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].text, "Visible text");
    }

    #[test]
    fn body_text_fallback_splits_on_breaks() {
        let html = "<html><body>Line one<br><br>Line two</body></html>";
        let units = text_units(html).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[1].text, "Line two");
    }

    #[test]
    fn html_without_text_is_malformed() {
        let result = text_units("<html><body><p> </p></body></html>");
        assert!(matches!(result, Err(ExtractionError::MalformedInput(_))));
    }

    #[test]
    fn entities_decoded() {
        assert_eq!(decode_entities("AT&amp;T &#36;250.0 &#x2014; ok"), "AT&T $250.0 - ok");
        assert_eq!(decode_entities("a&#160;b"), "a b");
    }
}
