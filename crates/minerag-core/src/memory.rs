//! Bounded conversational memory for one session.
//!
//! A session is a sequence of *rounds*. Each round pairs the query text of
//! one turn with the keywords that turn introduced, so the query history
//! and the keyword history stay index-aligned by construction: evicting
//! or removing a round always drops both halves together.
//!
//! # Invariants
//!
//! - At most `max_rounds` rounds are kept; pushing past the bound evicts
//!   the oldest round (FIFO).
//! - `seen` is exactly the union of the keyword sets of the surviving
//!   rounds. Every operation that drops rounds rebuilds it from what
//!   remains rather than subtracting, since a keyword may also live in a
//!   kept round.
//! - A keyword is stored in at most one round.

use std::collections::{HashSet, VecDeque};

/// Default number of rounds a session remembers.
pub const DEFAULT_MAX_ROUNDS: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Round {
    query: String,
    keywords: Vec<String>,
}

/// Query and keyword history for one conversation.
#[derive(Debug, Clone)]
pub struct SessionMemory {
    rounds: VecDeque<Round>,
    seen: HashSet<String>,
    max_rounds: usize,
}

impl Default for SessionMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ROUNDS)
    }
}

impl SessionMemory {
    /// Create an empty memory holding at most `max_rounds` rounds (minimum 1).
    pub fn new(max_rounds: usize) -> Self {
        Self {
            rounds: VecDeque::new(),
            seen: HashSet::new(),
            max_rounds: max_rounds.max(1),
        }
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    /// Start a new round for `query`. Blank queries are ignored.
    pub fn add_query(&mut self, query: &str) {
        let q = query.trim();
        if q.is_empty() {
            return;
        }
        self.push_round(Round {
            query: q.to_string(),
            keywords: Vec::new(),
        });
    }

    /// Record the keywords of the current turn.
    ///
    /// Keywords already present anywhere in memory are skipped. When
    /// nothing new remains, no round is touched. New keywords fill the
    /// latest round if it has none yet, otherwise they open a round of
    /// their own.
    pub fn add_keywords<S: AsRef<str>>(&mut self, keywords: &[S]) {
        let mut fresh: Vec<String> = Vec::new();
        for kw in keywords {
            let kw = kw.as_ref().trim();
            if kw.is_empty() || self.seen.contains(kw) || fresh.iter().any(|f| f == kw) {
                continue;
            }
            fresh.push(kw.to_string());
        }
        if fresh.is_empty() {
            return;
        }

        self.seen.extend(fresh.iter().cloned());
        match self.rounds.back_mut() {
            Some(last) if last.keywords.is_empty() => last.keywords = fresh,
            _ => self.push_round(Round {
                query: String::new(),
                keywords: fresh,
            }),
        }
    }

    /// Keywords introduced by the most recent round that has any.
    pub fn last_keywords(&self) -> Option<&[String]> {
        self.rounds
            .iter()
            .rev()
            .find(|r| !r.keywords.is_empty())
            .map(|r| r.keywords.as_slice())
    }

    /// The most recent query.
    pub fn last_query(&self) -> Option<&str> {
        self.rounds
            .iter()
            .rev()
            .find(|r| !r.query.is_empty())
            .map(|r| r.query.as_str())
    }

    /// Every remembered keyword, deduplicated, oldest first.
    pub fn all_keywords(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.rounds
            .iter()
            .flat_map(|r| r.keywords.iter())
            .filter(|kw| seen.insert(kw.as_str()))
            .cloned()
            .collect()
    }

    /// Every remembered query, oldest first, joined with newlines.
    pub fn all_queries(&self) -> String {
        self.query_history().join("\n")
    }

    /// Every remembered query, oldest first.
    pub fn query_history(&self) -> Vec<&str> {
        self.rounds
            .iter()
            .filter(|r| !r.query.is_empty())
            .map(|r| r.query.as_str())
            .collect()
    }

    /// Keyword sets of the remembered rounds, oldest first.
    pub fn keyword_history(&self) -> Vec<&[String]> {
        self.rounds
            .iter()
            .filter(|r| !r.keywords.is_empty())
            .map(|r| r.keywords.as_slice())
            .collect()
    }

    pub fn contains_keyword(&self, keyword: &str) -> bool {
        self.seen.contains(keyword)
    }

    pub fn seen_keywords(&self) -> &HashSet<String> {
        &self.seen
    }

    /// Drop every round whose keywords intersect `targets`, together with
    /// that round's query.
    pub fn remove_keywords<S: AsRef<str>>(&mut self, targets: &[S]) {
        let targets: HashSet<&str> = targets
            .iter()
            .map(|t| t.as_ref().trim())
            .filter(|t| !t.is_empty())
            .collect();
        if targets.is_empty() {
            return;
        }

        let before = self.rounds.len();
        self.rounds
            .retain(|r| !r.keywords.iter().any(|kw| targets.contains(kw.as_str())));
        if self.rounds.len() != before {
            self.rebuild_seen();
        }
    }

    /// Forget everything.
    pub fn reset(&mut self) {
        self.rounds.clear();
        self.seen.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    /// Number of rounds currently held.
    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    fn push_round(&mut self, round: Round) {
        let mut evicted = false;
        while self.rounds.len() >= self.max_rounds {
            self.rounds.pop_front();
            evicted = true;
        }
        self.rounds.push_back(round);
        if evicted {
            self.rebuild_seen();
        }
    }

    fn rebuild_seen(&mut self) {
        self.seen = self
            .rounds
            .iter()
            .flat_map(|r| r.keywords.iter().cloned())
            .collect();
    }
}
