//! Parse HTML into an ordered, deduplicated list of translatable text
//! fragments with stable IDs and locator paths.
//!
//! Pure: the same bytes always produce the same sequence. There are no
//! failure modes — empty or unparseable input yields an empty sequence via
//! the regex fallback.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use crate::hasher::{hash, normalize};

const MIN_CODE_POINTS: usize = 3;

const BLOCK_TAGS: &[&str] = &["p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "blockquote", "figcaption"];

const TRANSLATABLE_ATTRS: &[&str] = &["alt", "title", "placeholder", "aria-label", "aria-description"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub id: String,
    pub text: String,
    pub locator: Option<String>,
}

static TAG_FALLBACK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(p|h[1-6]|li|blockquote|figcaption)[^>]*>(.*?)</\1>").unwrap()
});

static ATTR_FALLBACK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)\b(alt|title|placeholder|aria-label|aria-description)\s*=\s*"([^"]*)""#).unwrap()
});

static TAG_STRIP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<[^>]+>").unwrap());

/// Segment an HTML document. `html` should already be bounded to the caller's
/// size cap (`MAX_HTML_BYTES`) before reaching this function.
pub fn segment(html: &str) -> Vec<Segment> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    if let Some(segments) = try_dom_segment(html) {
        for (text, locator) in segments {
            push_unique(&mut out, &mut seen, text, locator);
        }
    } else {
        for (text, locator) in fallback_segment(html) {
            push_unique(&mut out, &mut seen, text, locator);
        }
    }

    out
}

fn push_unique(
    out: &mut Vec<Segment>,
    seen: &mut std::collections::HashSet<String>,
    text: String,
    locator: Option<String>,
) {
    let normalized = normalize(&text);
    if normalized.chars().count() < MIN_CODE_POINTS {
        return;
    }
    let id = hash(&normalized);
    if seen.insert(id.clone()) {
        out.push(Segment { id, text: normalized, locator });
    }
}

/// Returns `None` only if the document could not be parsed at all (scraper's
/// parser is permissive and essentially never fails outright, but the
/// fallback path exists for implementations/inputs where it might).
///
/// Walks every element once, in document order, and for each one emits its
/// block-tag text candidate (if applicable) before its attribute candidates
/// — a single pass so first-occurrence dedup and the reconstructed
/// `completed_html` order both reflect where things actually sit in the
/// source, rather than "every block, then every attribute".
fn try_dom_segment(html: &str) -> Option<Vec<(String, Option<String>)>> {
    let stripped = strip_script_and_style(html);
    let document = Html::parse_document(&stripped);

    let any_selector = Selector::parse("*").ok()?;
    let mut candidates = Vec::new();
    let mut tag_counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();

    for element in document.select(&any_selector) {
        let tag = element.value().name();

        if BLOCK_TAGS.contains(&tag) {
            let text: String = element.text().collect::<Vec<_>>().join(" ");
            let count = tag_counts.entry(tag).or_insert(0);
            let locator = locator_for(tag, *count);
            *count += 1;
            candidates.push((text, Some(locator)));
        }

        for attr_name in TRANSLATABLE_ATTRS {
            if let Some(value) = element.value().attr(attr_name) {
                let locator = format!("{tag}[@{attr_name}]");
                candidates.push((value.to_string(), Some(locator)));
            }
        }
    }

    Some(candidates)
}

fn locator_for(tag: &str, index: usize) -> String {
    format!("{tag}:nth-of-type({})", index + 1)
}

fn strip_script_and_style(html: &str) -> String {
    static SCRIPT_STYLE_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?is)<(script|style)[^>]*>.*?</\1>").unwrap()
    });
    static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

    let no_comments = COMMENT_RE.replace_all(html, "");
    SCRIPT_STYLE_RE.replace_all(&no_comments, "").into_owned()
}

/// Lower-fidelity extraction used only when DOM parsing is unavailable.
/// Still honors normalization and dedup via `push_unique`'s caller.
fn fallback_segment(html: &str) -> Vec<(String, Option<String>)> {
    let stripped = strip_script_and_style(html);
    let mut candidates = Vec::new();

    for caps in TAG_FALLBACK_RE.captures_iter(&stripped) {
        let inner = &caps[2];
        let text = TAG_STRIP_RE.replace_all(inner, " ").into_owned();
        candidates.push((text, None));
    }

    for caps in ATTR_FALLBACK_RE.captures_iter(&stripped) {
        candidates.push((caps[2].to_string(), None));
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_block_tag_text() {
        let segs = segment("<p>Hello world.</p><p>Goodbye.</p>");
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].text, "Hello world.");
        assert_eq!(segs[1].text, "Goodbye.");
    }

    #[test]
    fn extracts_translatable_attributes() {
        let segs = segment(r#"<img src="x.png" alt="A cat sitting down">"#);
        assert!(segs.iter().any(|s| s.text == "A cat sitting down"));
    }

    #[test]
    fn drops_script_and_style_content() {
        let segs = segment("<script>var x = 'hidden text here';</script><p>Visible.</p>");
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].text, "Visible.");
    }

    #[test]
    fn discards_short_candidates() {
        let segs = segment("<p>Hi</p><p>ok</p>");
        assert!(segs.is_empty() || segs.iter().all(|s| s.text.chars().count() >= 3));
    }

    #[test]
    fn dedups_by_hash_keeping_first_occurrence() {
        let segs = segment("<p>Repeat me.</p><p>Repeat me.</p><p>Unique.</p>");
        assert_eq!(segs.len(), 2);
    }

    #[test]
    fn candidates_follow_document_order_across_attributes_and_blocks() {
        // "Shared text" appears first as an `alt` attribute, then later as a
        // block's text — the output must keep the attribute's earlier
        // position rather than grouping all block text ahead of attributes.
        let html = r#"<img src="a.png" alt="Shared text"><p>Before it.</p><p>Shared text</p>"#;
        let segs = segment(html);
        let positions: Vec<&str> = segs.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(positions, vec!["Shared text", "Before it."]);
    }

    #[test]
    fn block_text_and_its_own_attribute_both_appear_in_order() {
        let html = r#"<p>First paragraph.</p><img alt="An image caption"><p>Last paragraph.</p>"#;
        let segs = segment(html);
        let positions: Vec<&str> = segs.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(positions, vec!["First paragraph.", "An image caption", "Last paragraph."]);
    }

    #[test]
    fn normalizes_whitespace_before_hashing() {
        let segs = segment("<p>Hello   \n   world.</p>");
        assert_eq!(segs[0].text, "Hello world.");
    }

    #[test]
    fn empty_input_yields_empty_sequence() {
        assert!(segment("").is_empty());
    }

    #[test]
    fn is_pure() {
        let html = "<p>Determinism check.</p><li>List item here.</li>";
        assert_eq!(segment(html), segment(html));
    }

    #[test]
    fn fallback_extracts_same_tag_set() {
        let html = "<p>Fallback text here.</p>";
        let segs = fallback_segment(html);
        assert!(!segs.is_empty());
    }
}
