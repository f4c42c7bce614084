//! In-memory [`DocumentIndex`] for tests.
//!
//! Stores [`FragmentRecord`]s per index name behind `std::sync::RwLock`
//! and evaluates queries with plain substring matching. Quoted phrases,
//! the three match strategies, `field = "value"` filters joined by `OR`,
//! `sequenceIndex` sorting, pagination and highlighting are understood,
//! which is enough to drive the retrieval tiers deterministically.
//!
//! Every query is logged so tests can assert on the exact sequence the
//! engine issued, and [`InMemoryIndex::fail_next`] injects failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::models::{FragmentRecord, MatchStrategy, FIELD_SEGMENT_CONTENT, FIELD_SEQUENCE_INDEX};

use super::{DocumentIndex, FormattedFields, IndexError, IndexHit, SearchQuery};

const DEFAULT_LIMIT: usize = 20;

/// In-memory index store for tests.
#[derive(Default)]
pub struct InMemoryIndex {
    indexes: RwLock<HashMap<String, Vec<FragmentRecord>>>,
    scores: RwLock<HashMap<String, f64>>,
    queries: RwLock<Vec<SearchQuery>>,
    failures: AtomicUsize,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty index. Existing indexes are left untouched.
    pub fn create_index(&self, name: &str) {
        write(&self.indexes).entry(name.to_string()).or_default();
    }

    pub fn drop_index(&self, name: &str) -> bool {
        write(&self.indexes).remove(name).is_some()
    }

    pub fn has_index(&self, name: &str) -> bool {
        read(&self.indexes).contains_key(name)
    }

    /// Add records to `name`, creating the index if needed. Records with
    /// an existing id replace the stored copy.
    pub fn insert(&self, name: &str, records: Vec<FragmentRecord>) {
        let mut indexes = write(&self.indexes);
        let stored = indexes.entry(name.to_string()).or_default();
        for record in records {
            match stored.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record,
                None => stored.push(record),
            }
        }
    }

    /// Delete records by id, returning how many were removed.
    pub fn remove(&self, name: &str, ids: &[String]) -> usize {
        let mut indexes = write(&self.indexes);
        let Some(stored) = indexes.get_mut(name) else {
            return 0;
        };
        let before = stored.len();
        stored.retain(|r| !ids.contains(&r.id));
        before - stored.len()
    }

    pub fn records(&self, name: &str) -> Option<Vec<FragmentRecord>> {
        read(&self.indexes).get(name).cloned()
    }

    /// Pin the ranking score reported for record `id`.
    pub fn set_score(&self, id: &str, score: f64) {
        write(&self.scores).insert(id.to_string(), score);
    }

    /// Every query received so far, oldest first.
    pub fn queries(&self) -> Vec<SearchQuery> {
        read(&self.queries).clone()
    }

    pub fn clear_queries(&self) {
        write(&self.queries).clear();
    }

    /// Make the next `n` searches fail with a transport error.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// A query term. Phrases match exactly, bare words ignore ASCII case.
#[derive(Debug, Clone, PartialEq)]
struct Term {
    text: String,
    phrase: bool,
}

/// Split a query string into terms; double-quoted runs are one term.
fn parse_terms(q: &str) -> Vec<Term> {
    let mut terms = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in q.chars() {
        match c {
            '"' => {
                if !current.is_empty() {
                    terms.push(Term {
                        text: std::mem::take(&mut current),
                        phrase: quoted,
                    });
                }
                quoted = !quoted;
            }
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    terms.push(Term {
                        text: std::mem::take(&mut current),
                        phrase: false,
                    });
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        terms.push(Term {
            text: current,
            phrase: quoted,
        });
    }
    terms
}

/// Parse `(a = "x" OR b = "y")` into its alternatives.
fn parse_disjunction(expr: &str) -> Vec<(String, String)> {
    let inner = expr.trim().trim_start_matches('(').trim_end_matches(')');
    inner
        .split(" OR ")
        .filter_map(|clause| {
            let (field, value) = clause.split_once('=')?;
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value)
                .replace("\\\"", "\"");
            Some((field.trim().to_string(), value))
        })
        .collect()
}

fn field_value(record: &FragmentRecord, field: &str) -> Option<String> {
    match field {
        "id" => Some(record.id.clone()),
        "title" => Some(record.title.clone()),
        "sequenceIndex" => Some(record.sequence_index.to_string()),
        "fileType" => record.file_type.clone(),
        "knowledgeLabel" => Some(record.knowledge_label.clone()),
        _ => None,
    }
}

fn matches_term(record: &FragmentRecord, term: &Term) -> bool {
    if term.phrase {
        return record.title.contains(&term.text) || record.segment_content.contains(&term.text);
    }
    let needle = term.text.to_ascii_lowercase();
    record.title.to_ascii_lowercase().contains(&needle)
        || record.segment_content.to_ascii_lowercase().contains(&needle)
}

/// Wrap exact occurrences of any term in `pre`/`post`.
fn highlight(text: &str, terms: &[Term], pre: &str, post: &str) -> String {
    let mut marked = vec![false; text.len()];
    for term in terms.iter().filter(|t| !t.text.is_empty()) {
        for (start, _) in text.match_indices(term.text.as_str()) {
            marked[start..start + term.text.len()].fill(true);
        }
    }
    let mut out = String::with_capacity(text.len());
    let mut open = false;
    for (i, c) in text.char_indices() {
        if marked[i] != open {
            out.push_str(if open { post } else { pre });
            open = marked[i];
        }
        out.push(c);
    }
    if open {
        out.push_str(post);
    }
    out
}

#[async_trait]
impl DocumentIndex for InMemoryIndex {
    async fn search(&self, index: &str, query: &SearchQuery) -> Result<Vec<IndexHit>, IndexError> {
        write(&self.queries).push(query.clone());
        if self.take_failure() {
            return Err(IndexError::Transport("injected failure".to_string()));
        }

        let indexes = read(&self.indexes);
        let records = indexes
            .get(index)
            .ok_or_else(|| IndexError::NotFound(index.to_string()))?;

        let filters: Vec<Vec<(String, String)>> =
            query.filter.iter().map(|f| parse_disjunction(f)).collect();
        let candidates: Vec<&FragmentRecord> = records
            .iter()
            .filter(|r| {
                filters.iter().all(|alts| {
                    alts.is_empty()
                        || alts
                            .iter()
                            .any(|(f, v)| field_value(r, f).as_deref() == Some(v.as_str()))
                })
            })
            .collect();

        let terms = parse_terms(&query.q);
        let total = terms.len().max(1) as f64;
        let strategy = query.matching_strategy.unwrap_or(MatchStrategy::Last);

        let mut scored: Vec<(&FragmentRecord, f64)> = if terms.is_empty() {
            candidates.into_iter().map(|r| (r, 1.0)).collect()
        } else {
            match strategy {
                MatchStrategy::All => candidates
                    .into_iter()
                    .filter(|r| terms.iter().all(|t| matches_term(r, t)))
                    .map(|r| (r, 1.0))
                    .collect(),
                MatchStrategy::Last => {
                    let mut found = Vec::new();
                    for n in (1..=terms.len()).rev() {
                        found = candidates
                            .iter()
                            .filter(|r| terms[..n].iter().all(|t| matches_term(r, t)))
                            .map(|r| (*r, n as f64 / total))
                            .collect();
                        if !found.is_empty() {
                            break;
                        }
                    }
                    found
                }
                MatchStrategy::Frequency => candidates
                    .into_iter()
                    .filter_map(|r| {
                        let matched = terms.iter().filter(|t| matches_term(r, t)).count();
                        (matched > 0).then(|| (r, matched as f64 / total))
                    })
                    .collect(),
            }
        };

        let pinned = read(&self.scores);
        for (record, score) in scored.iter_mut() {
            if let Some(p) = pinned.get(&record.id) {
                *score = *p;
            }
        }

        let seq_sort = query
            .sort
            .iter()
            .find_map(|rule| rule.strip_prefix(FIELD_SEQUENCE_INDEX)?.strip_prefix(':'));
        match seq_sort {
            Some("desc") => scored.sort_by(|a, b| b.0.sequence_index.cmp(&a.0.sequence_index)),
            Some(_) => scored.sort_by_key(|(r, _)| r.sequence_index),
            None => scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)),
        }

        let highlight_segment = query
            .attributes_to_highlight
            .iter()
            .any(|a| a == FIELD_SEGMENT_CONTENT || a == "*");
        let pre = query.highlight_pre_tag.as_deref().unwrap_or("<em>");
        let post = query.highlight_post_tag.as_deref().unwrap_or("</em>");

        Ok(scored
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(DEFAULT_LIMIT))
            .map(|(r, score)| IndexHit {
                id: r.id.clone(),
                title: r.title.clone(),
                content: Some(r.content.clone()),
                segment_content: Some(r.segment_content.clone()),
                sequence_index: Some(r.sequence_index),
                file_type: r.file_type.clone(),
                ranking_score: query.show_ranking_score.then_some(score),
                formatted: highlight_segment.then(|| FormattedFields {
                    content: None,
                    segment_content: Some(highlight(&r.segment_content, &terms, pre, post)),
                }),
            })
            .collect())
    }
}
