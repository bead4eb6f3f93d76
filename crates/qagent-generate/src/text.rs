//! Lightweight text measures shared by grounding and the rule-based strategy.

use once_cell::sync::Lazy;
use regex::Regex;

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9]+").expect("word regex"));
static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+\s+").expect("sentence regex"));
static FIGURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?P<money>[$€£]\s?\d+(?:,\d{3})*(?:\.\d+)?)|(?P<pct>\b\d+(?:\.\d+)?\s?%)|(?P<num>\b\d+(?:,\d{3})*(?:\.\d+)?\b)",
    )
    .expect("figure regex")
});

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "these", "those", "are", "was", "were", "from", "into", "onto",
    "has", "have", "had", "been", "being", "its", "their", "then", "than", "when", "which", "who", "what", "where",
    "while", "you", "your", "our", "any", "all", "can", "will", "there", "also", "each", "per",
];

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Crude suffix stripping so "codes"/"code" and "required"/"require" compare equal.
pub fn stem(word: &str) -> String {
    let w = word.to_ascii_lowercase();
    let mut base = w.clone();
    for (suffix, min) in [("ing", 6), ("ied", 5), ("ies", 5), ("ed", 5), ("s", 4)] {
        if w.len() >= min && w.ends_with(suffix) && !w.ends_with("ss") {
            let root = &w[..w.len() - suffix.len()];
            base = if suffix.starts_with('i') { format!("{root}y") } else { root.to_string() };
            break;
        }
    }
    if base.len() >= 4 && base.ends_with('e') {
        base.pop();
    }
    base
}

/// Lowercased, stemmed words of three or more characters, stop words and bare
/// numbers removed. Numbers are compared through [`figures`] instead.
pub fn content_words(text: &str) -> Vec<String> {
    WORD.find_iter(text)
        .map(|m| m.as_str().to_ascii_lowercase())
        .filter(|w| w.len() >= 3 && !is_stop_word(w) && !w.chars().all(|c| c.is_ascii_digit()))
        .map(|w| stem(&w))
        .collect()
}

/// Case- and punctuation-insensitive form used for substring matching.
pub fn normalize(text: &str) -> String {
    let mapped: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '$' | '%' | '.' | ',' | '€' | '£') { c.to_ascii_lowercase() } else { ' ' })
        .collect();
    let collapsed = mapped.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_matches(|c: char| c == '.' || c == ',').trim().to_string()
}

/// Normalized whitespace tokens with sentence punctuation stripped from
/// their ends, so "$10.00," and "$10.00" compare equal but "$10" and "$100"
/// do not.
pub fn tokens(text: &str) -> Vec<String> {
    normalize(text)
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| c == '.' || c == ','))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// True when `needle` occurs in `haystack` as a contiguous run of whole tokens.
pub fn contains_tokens(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

/// Splits text into sentences at line breaks and terminal punctuation.
/// Decimal points ("$10.00") do not end a sentence.
pub fn sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in text.lines() {
        let mut start = 0;
        for m in SENTENCE_END.find_iter(line) {
            let end = m.start() + m.as_str().trim_end().len();
            push_sentence(&mut out, &line[start..end]);
            start = m.end();
        }
        push_sentence(&mut out, &line[start..]);
    }
    out
}

fn push_sentence(out: &mut Vec<String>, raw: &str) {
    let s = raw.trim();
    if s.chars().filter(|c| c.is_alphanumeric()).count() >= 3 {
        out.push(s.to_string());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FigureKind {
    Money,
    Percent,
    Number,
}

/// A numeric quantity mentioned in text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Figure {
    pub kind: FigureKind,
    pub value: f64,
}

impl Figure {
    /// Same value and same unit. A bare number only matches a bare number.
    pub fn matches(&self, other: &Figure) -> bool {
        self.kind == other.kind && (self.value - other.value).abs() < 1e-6
    }
}

pub fn figures(text: &str) -> Vec<Figure> {
    FIGURE
        .captures_iter(text)
        .filter_map(|caps| {
            let (kind, raw) = if let Some(m) = caps.name("money") {
                (FigureKind::Money, m.as_str())
            } else if let Some(m) = caps.name("pct") {
                (FigureKind::Percent, m.as_str())
            } else {
                (FigureKind::Number, caps.name("num")?.as_str())
            };
            let digits: String = raw.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
            digits.parse::<f64>().ok().map(|value| Figure { kind, value })
        })
        .collect()
}

/// The figures of `text` as written, in order of appearance.
pub fn figure_texts(text: &str) -> Vec<&str> {
    FIGURE.find_iter(text).map(|m| m.as_str()).collect()
}

/// True when every figure in `claim` appears in `source`.
pub fn figures_supported(claim: &str, source: &str) -> bool {
    let available = figures(source);
    figures(claim).iter().all(|f| available.iter().any(|g| f.matches(g)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_with_and_without_cents_match() {
        let a = figures("SAVE10 provides $10.00 off");
        assert_eq!(a.len(), 1, "code suffix digits are not a figure: {a:?}");
        assert!(a[0].matches(&figures("$10")[0]));
        assert!(!a[0].matches(&figures("$15")[0]));
        assert!(!a[0].matches(&figures("10%")[0]));
    }

    #[test]
    fn bare_numbers_do_not_stand_in_for_amounts() {
        let money = figures("$5 off")[0];
        let count = figures("Limit 5 codes")[0];
        assert_eq!(count.kind, FigureKind::Number);
        assert!(!money.matches(&count));
        assert!(!count.matches(&money));
        assert!(!figures_supported("$5 off", "Limit 5 codes per customer"));
        assert!(figures_supported("limit of 5", "Limit 5 codes per customer"));
    }

    #[test]
    fn token_runs_respect_word_boundaries() {
        let hay = tokens("Orders over $100 ship free.");
        assert!(!contains_tokens(&hay, &tokens("Orders over $10")));
        assert!(contains_tokens(&hay, &tokens("over $100 ship free")));
        assert!(!contains_tokens(&tokens("SAVE10 provides $10.00 off."), &tokens("SAVE10 provides $1")));
        assert!(!contains_tokens(&hay, &[]));
    }

    #[test]
    fn sentences_keep_decimal_points() {
        let s = sentences("SAVE10 provides $10.00 off. Express shipping costs $5.\nFree over $100");
        assert_eq!(s, vec!["SAVE10 provides $10.00 off.", "Express shipping costs $5.", "Free over $100"]);
    }

    #[test]
    fn content_words_are_stemmed_and_filtered() {
        assert_eq!(content_words("The Discount codes are applied"), vec!["discount", "cod", "apply"]);
    }

    #[test]
    fn normalize_ignores_case_and_trailing_period() {
        assert_eq!(normalize("  SAVE10   provides $10.00 off. "), "save10 provides $10.00 off");
    }
}
