//! Text normalization and intent matching.
//!
//! Everything here is deliberately substring matching, not NLP — cheap,
//! deterministic, auditable. The same `normalize` feeds operator-intent
//! detection, scenario triggers, yes/no extraction, and retrieval
//! tokenization.

/// Phrases that request a human operator. Substring-matched against
/// normalized text, so stems like `соед` cover `соедините` / `соединить`.
pub const OPERATOR_PHRASES: &[&str] = &["оператор", "человек", "соед", "менеджер", "поддерж"];

/// Query tokens too generic to contribute to retrieval scoring.
pub const STOP_WORDS: &[&str] = &["как", "что", "это", "или", "для", "при", "есть"];

/// Lowercase, fold `ё` to `е`, strip everything outside latin/cyrillic
/// letters, digits, and whitespace, collapse whitespace, trim.
/// Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'ё' => 'е',
            'a'..='z' | 'а'..='я' | '0'..='9' => c,
            c if c.is_whitespace() => ' ',
            _ => ' ',
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Does the text ask for a human operator?
pub fn wants_operator(text: &str) -> bool {
    let t = normalize(text);
    OPERATOR_PHRASES.iter().any(|phrase| t.contains(phrase))
}

/// Extracted yes/no answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YesNo {
    Yes,
    No,
}

impl YesNo {
    /// Canonical stored form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
        }
    }
}

/// Extract a yes/no answer; `да` wins over `нет` when both occur.
/// Returns None for anything ambiguous.
pub fn yes_no(text: &str) -> Option<YesNo> {
    let t = normalize(text);
    if t.contains("да") {
        Some(YesNo::Yes)
    } else if t.contains("нет") {
        Some(YesNo::No)
    } else {
        None
    }
}

/// Tokenize a retrieval query: normalize, split on whitespace, drop
/// tokens of length <= 2 or in the stop-word set, dedupe preserving
/// first-seen order.
pub fn query_tokens(query: &str) -> Vec<String> {
    let normalized = normalize(query);
    let mut seen = Vec::new();
    for token in normalized.split_whitespace() {
        if token.chars().count() <= 2 || STOP_WORDS.contains(&token) {
            continue;
        }
        if !seen.iter().any(|t| t == token) {
            seen.push(token.to_string());
        }
    }
    seen
}
