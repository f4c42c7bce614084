//! Tiered keyword retrieval.
//!
//! Searches escalate through three tiers, strictly in order, and stop at
//! the first tier that returns at least one hit:
//!
//! 1. **Phrase backoff**: the first `n` keywords as quoted phrases, every
//!    phrase required, for `n = len..=1`.
//! 2. **Keyword union**: all keywords unquoted, trailing terms optional.
//! 3. **Full history**: the whole remembered query history, trailing
//!    terms optional.
//!
//! Any index error aborts the search and propagates; recovery is the
//! caller's business.

use tracing::debug;

use crate::index::{DocumentIndex, IndexError, SearchQuery};
use crate::keywords::KeywordExtractor;
use crate::memory::SessionMemory;
use crate::models::{MatchStrategy, SearchHit, FIELD_SEGMENT_CONTENT, FIELD_TITLE};

/// Parameters of one retrieval call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalOptions {
    /// Maximum hits requested from the index per query.
    pub top_k: usize,
    /// Restrict hits to these source titles. Empty means unrestricted.
    pub allowed_ids: Vec<String>,
    pub highlight_pre_tag: String,
    pub highlight_post_tag: String,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top_k: 100,
            allowed_ids: Vec::new(),
            highlight_pre_tag: "<mark>".to_string(),
            highlight_post_tag: "</mark>".to_string(),
        }
    }
}

/// Which tier produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Phrase query over the first `n` keywords.
    Phrase(usize),
    KeywordUnion,
    FullHistory,
}

/// Inclusion filter matching any of `titles` exactly.
///
/// Returns `None` for an empty list.
pub fn title_filter(titles: &[String]) -> Option<String> {
    if titles.is_empty() {
        return None;
    }
    let clauses: Vec<String> = titles
        .iter()
        .map(|t| format!("{} = \"{}\"", FIELD_TITLE, t.replace('"', "\\\"")))
        .collect();
    Some(format!("({})", clauses.join(" OR ")))
}

/// Query text for tier 1: the first `n` keywords as quoted phrases.
pub fn phrase_query(keywords: &[String], n: usize) -> String {
    keywords
        .iter()
        .take(n)
        .map(|k| format!("\"{}\"", k))
        .collect::<Vec<_>>()
        .join(" ")
}

fn build_query(q: String, strategy: MatchStrategy, filter: Option<&String>, opts: &RetrievalOptions) -> SearchQuery {
    let mut query = SearchQuery::new(q)
        .with_limit(opts.top_k)
        .with_strategy(strategy)
        .with_highlight(
            FIELD_SEGMENT_CONTENT,
            opts.highlight_pre_tag.as_str(),
            opts.highlight_post_tag.as_str(),
        )
        .with_ranking_score();
    if let Some(f) = filter {
        query = query.with_filter(f.clone());
    }
    query
}

async fn run(
    index: &dyn DocumentIndex,
    index_name: &str,
    query: &SearchQuery,
) -> Result<Vec<SearchHit>, IndexError> {
    let hits = index.search(index_name, query).await?;
    Ok(hits.into_iter().map(|h| h.into_search_hit()).collect())
}

/// Run the three tiers for `keywords`, falling back to `history` (the
/// space-joined query history) in tier 3.
///
/// Returns the producing tier along with its hits, or `None` and no hits
/// when every tier came back empty. No keywords means no search at all.
pub async fn tiered_search_with_tier(
    index: &dyn DocumentIndex,
    index_name: &str,
    keywords: &[String],
    history: &str,
    opts: &RetrievalOptions,
) -> Result<(Option<Tier>, Vec<SearchHit>), IndexError> {
    if keywords.is_empty() {
        debug!("no keywords, skipping search");
        return Ok((None, Vec::new()));
    }
    let filter = title_filter(&opts.allowed_ids);

    for n in (1..=keywords.len()).rev() {
        let query = build_query(phrase_query(keywords, n), MatchStrategy::All, filter.as_ref(), opts);
        let hits = run(index, index_name, &query).await?;
        debug!(phrases = n, hits = hits.len(), "phrase tier");
        if !hits.is_empty() {
            return Ok((Some(Tier::Phrase(n)), hits));
        }
    }

    let query = build_query(keywords.join(" "), MatchStrategy::Last, filter.as_ref(), opts);
    let hits = run(index, index_name, &query).await?;
    debug!(hits = hits.len(), "keyword union tier");
    if !hits.is_empty() {
        return Ok((Some(Tier::KeywordUnion), hits));
    }

    let history = history.trim();
    if history.is_empty() {
        return Ok((None, Vec::new()));
    }
    let query = build_query(history.to_string(), MatchStrategy::Last, filter.as_ref(), opts);
    let hits = run(index, index_name, &query).await?;
    debug!(hits = hits.len(), "full history tier");
    if hits.is_empty() {
        Ok((None, hits))
    } else {
        Ok((Some(Tier::FullHistory), hits))
    }
}

/// [`tiered_search_with_tier`] without the tier.
pub async fn tiered_search(
    index: &dyn DocumentIndex,
    index_name: &str,
    keywords: &[String],
    history: &str,
    opts: &RetrievalOptions,
) -> Result<Vec<SearchHit>, IndexError> {
    let (_, hits) = tiered_search_with_tier(index, index_name, keywords, history, opts).await?;
    Ok(hits)
}

/// One conversational turn: remember `query`, extract keywords from the
/// whole remembered history (possibly purging superseded entities),
/// remember the keywords, then run the tiers.
pub async fn search(
    index: &dyn DocumentIndex,
    extractor: &KeywordExtractor,
    memory: &mut SessionMemory,
    index_name: &str,
    query: &str,
    opts: &RetrievalOptions,
) -> Result<Vec<SearchHit>, IndexError> {
    memory.add_query(query);
    let text = memory.all_queries();
    let keywords = extractor.get_keywords(&text, Some(memory)).await;
    memory.add_keywords(&keywords);

    let history = memory.query_history().join(" ");
    tiered_search(index, index_name, &keywords, &history, opts).await
}
