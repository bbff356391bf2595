//! Keyword ranking shared by the fact stores.
//!
//! The query is split into lowercase terms; an entry's score is the share
//! of terms that occur in its content. Entries scoring zero are dropped.
//! An empty query matches everything (score 1.0), newest first.

use deskhand_core::memory::{MemoryEntry, MemoryQuery};

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "do", "does", "i", "my", "me", "what", "of", "to", "in",
    "and", "or", "for", "on",
];

fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

pub fn rank<'a>(
    entries: impl IntoIterator<Item = &'a MemoryEntry>,
    query: &MemoryQuery,
) -> Vec<MemoryEntry> {
    let query_terms = terms(&query.text);

    let mut results: Vec<MemoryEntry> = entries
        .into_iter()
        .filter(|e| query.tags.iter().all(|t| e.tags.contains(t)))
        .filter_map(|e| {
            let score = if query_terms.is_empty() {
                1.0
            } else {
                let content = e.content.to_lowercase();
                let hits = query_terms.iter().filter(|t| content.contains(t.as_str())).count();
                hits as f32 / query_terms.len() as f32
            };
            (score > 0.0).then(|| {
                let mut e = e.clone();
                e.score = score;
                e
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.created_at.cmp(&a.created_at))
    });
    results.truncate(query.limit);
    results
}
