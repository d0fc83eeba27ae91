//! Relevance ranking and budgeted fragment selection.
//!
//! Ranking is pluggable through [`RelevanceRanker`]. Selection is not: fragments are
//! ordered by score descending with fragment id as the tie breaker, then taken greedily
//! under the fragment-count and byte budgets.

use super::fragment::Fragment;
use super::snapshot::RankedFragment;
use std::collections::BTreeSet;

/// Words too common to carry relevance.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "into", "is", "it",
    "of", "on", "or", "that", "the", "this", "to", "with",
];

/// Pre-tokenized query text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub text: String,
    pub terms: BTreeSet<String>,
}

impl Query {
    pub fn new(text: &str) -> Self {
        let terms = tokenize(text)
            .filter(|t| t.len() > 1 && !STOPWORDS.contains(&t.as_str()))
            .collect();
        Self {
            text: text.to_string(),
            terms,
        }
    }
}

/// Lower-cased alphanumeric runs (underscores split words).
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

pub trait RelevanceRanker: Send + Sync {
    fn name(&self) -> &str;

    /// Zero means irrelevant; such fragments are never selected.
    fn score(&self, query: &Query, fragment: &Fragment) -> u64;
}

/// Term-overlap scoring with a bonus for terms found in the source path.
#[derive(Debug, Clone)]
pub struct KeywordRanker {
    pub term_weight: u64,
    /// Occurrences of one term beyond this count add nothing
    pub max_occurrences: u64,
    pub path_bonus: u64,
}

impl Default for KeywordRanker {
    fn default() -> Self {
        Self {
            term_weight: 10,
            max_occurrences: 5,
            path_bonus: 15,
        }
    }
}

impl RelevanceRanker for KeywordRanker {
    fn name(&self) -> &str {
        "keyword"
    }

    fn score(&self, query: &Query, fragment: &Fragment) -> u64 {
        if query.terms.is_empty() {
            return 0;
        }
        let mut counts = std::collections::HashMap::<String, u64>::new();
        for token in tokenize(&fragment.content) {
            if query.terms.contains(&token) {
                *counts.entry(token).or_default() += 1;
            }
        }
        let path_terms: BTreeSet<String> = tokenize(&fragment.source).collect();

        query
            .terms
            .iter()
            .map(|term| {
                let hits = counts.get(term).copied().unwrap_or(0).min(self.max_occurrences);
                let bonus = if path_terms.contains(term) {
                    self.path_bonus
                } else {
                    0
                };
                hits * self.term_weight + bonus
            })
            .sum()
    }
}

/// Size bound for one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotBudget {
    pub max_fragments: usize,
    pub max_bytes: usize,
}

impl Default for SnapshotBudget {
    fn default() -> Self {
        Self {
            max_fragments: 10,
            max_bytes: 64 * 1024,
        }
    }
}

/// Score, order and trim `fragments` for `query`.
///
/// A fragment that would overflow the byte budget is skipped and smaller, lower
/// ranked fragments may still fill the remaining space.
pub fn select_fragments(
    ranker: &dyn RelevanceRanker,
    query: &Query,
    fragments: Vec<Fragment>,
    budget: SnapshotBudget,
) -> Vec<RankedFragment> {
    let mut scored: Vec<RankedFragment> = fragments
        .into_iter()
        .filter_map(|fragment| {
            let score = ranker.score(query, &fragment);
            (score > 0).then_some(RankedFragment { score, fragment })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.fragment.id.cmp(&b.fragment.id))
    });

    let mut selected = Vec::new();
    let mut used_bytes = 0usize;
    for ranked in scored {
        if selected.len() >= budget.max_fragments {
            break;
        }
        let len = ranked.fragment.byte_len();
        if used_bytes + len > budget.max_bytes {
            continue;
        }
        used_bytes += len;
        selected.push(ranked);
    }
    selected
}
