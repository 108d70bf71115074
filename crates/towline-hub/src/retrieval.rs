//! Keyword retrieval over a small local knowledge base.
//!
//! No vector store, no index: snippets live in memory and are scored by
//! query-token overlap. An empty result is a policy branch for the
//! dispatcher (hand off instead of answering ungrounded), not an error.

use std::path::Path;

use tracing::info;

use towline_core::error::Result;
use towline_core::text::query_tokens;

/// One knowledge-base snippet.
#[derive(Debug, Clone)]
pub struct Snippet {
    pub source: String,
    pub text: String,
}

/// A snippet with its retrieval score.
#[derive(Debug, Clone)]
pub struct ScoredSnippet {
    pub source: String,
    pub text: String,
    pub score: usize,
}

/// Maximum snippets returned per query.
const TOP_K: usize = 3;

/// In-memory knowledge base.
pub struct KnowledgeBase {
    snippets: Vec<Snippet>,
}

impl KnowledgeBase {
    /// Build from literal snippets (used by tests and embedded knowledge).
    pub fn from_snippets(snippets: Vec<Snippet>) -> Self {
        Self { snippets }
    }

    /// Load `.txt`/`.md` files from a directory. Files are read in name
    /// order and split into snippets on blank lines, so insertion order —
    /// and with it tie-breaking — is deterministic.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("txt") | Some("md")
                )
            })
            .collect();
        paths.sort();

        let mut snippets = Vec::new();
        for path in paths {
            let source = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let content = std::fs::read_to_string(&path)?;
            for block in content.split("\n\n") {
                let text = block.trim();
                if !text.is_empty() {
                    snippets.push(Snippet {
                        source: source.clone(),
                        text: text.to_string(),
                    });
                }
            }
        }

        info!("📚 Knowledge base loaded: {} snippets", snippets.len());
        Ok(Self { snippets })
    }

    pub fn len(&self) -> usize {
        self.snippets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    /// Score snippets against the query: one point per distinct filtered
    /// query token found as a case-insensitive substring of the snippet.
    /// Returns at most three snippets with score > 0, best first; ties
    /// keep insertion order (stable sort).
    pub fn retrieve(&self, query: &str) -> Vec<ScoredSnippet> {
        let tokens = query_tokens(query);
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<ScoredSnippet> = self
            .snippets
            .iter()
            .filter_map(|snippet| {
                let haystack = snippet.text.to_lowercase();
                let score = tokens.iter().filter(|t| haystack.contains(t.as_str())).count();
                (score > 0).then(|| ScoredSnippet {
                    source: snippet.source.clone(),
                    text: snippet.text.clone(),
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.cmp(&a.score));
        scored.truncate(TOP_K);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn kb(texts: &[&str]) -> KnowledgeBase {
        KnowledgeBase::from_snippets(
            texts
                .iter()
                .enumerate()
                .map(|(i, t)| Snippet {
                    source: format!("kb-{}.md", i),
                    text: (*t).to_string(),
                })
                .collect(),
        )
    }

    #[test]
    fn ranks_overlapping_snippet_and_excludes_zero_score() {
        let kb = kb(&["Поддержка работает с 9 до 18", "Оплата картой"]);
        let results = kb.retrieve("когда работает поддержка");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "Поддержка работает с 9 до 18");
        assert!(results[0].score > 0);
    }

    #[test]
    fn returns_empty_when_nothing_matches() {
        let kb = kb(&["Оплата картой", "Доставка по городу"]);
        assert!(kb.retrieve("где мой заказ").is_empty());
        assert!(kb.retrieve("").is_empty());
    }

    #[test]
    fn caps_at_three_and_keeps_insertion_order_on_ties() {
        let kb = kb(&[
            "эвакуатор в центре",
            "эвакуатор на севере",
            "эвакуатор на юге",
            "эвакуатор за городом",
        ]);
        let results = kb.retrieve("нужен эвакуатор");

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].source, "kb-0.md");
        assert_eq!(results[1].source, "kb-1.md");
        assert_eq!(results[2].source, "kb-2.md");
    }

    #[test]
    fn higher_overlap_wins() {
        let kb = kb(&["только доставка", "доставка и оплата картой"]);
        let results = kb.retrieve("доставка оплата");

        assert_eq!(results[0].text, "доставка и оплата картой");
        assert_eq!(results[0].score, 2);
        assert_eq!(results[1].score, 1);
    }

    #[test]
    fn loads_snippets_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("hours.md")).unwrap();
        writeln!(f, "Поддержка работает с 9 до 18\n\nВыходные: суббота").unwrap();
        std::fs::File::create(dir.path().join("ignored.bin")).unwrap();

        let kb = KnowledgeBase::load(dir.path()).unwrap();
        assert_eq!(kb.len(), 2);
        assert!(!kb.retrieve("когда работает поддержка").is_empty());
    }
}
