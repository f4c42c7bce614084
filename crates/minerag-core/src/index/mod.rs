//! Document index abstraction.
//!
//! The [`DocumentIndex`] trait is the only seam between the retrieval
//! engine and the external full-text index service. The app crate
//! implements it over HTTP; [`memory::InMemoryIndex`] implements it for
//! tests.
//!
//! Request and response shapes follow the index service's JSON API, so
//! the HTTP client can send a [`SearchQuery`] as-is and decode
//! [`IndexHit`]s directly.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{MatchStrategy, SearchHit};

/// A search request against one index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchQuery {
    pub q: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    /// Filter expressions, all of which must hold.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matching_strategy: Option<MatchStrategy>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attributes_to_retrieve: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attributes_to_highlight: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight_pre_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight_post_tag: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub show_ranking_score: bool,
}

impl SearchQuery {
    pub fn new(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_strategy(mut self, strategy: MatchStrategy) -> Self {
        self.matching_strategy = Some(strategy);
        self
    }

    pub fn with_filter(mut self, expr: impl Into<String>) -> Self {
        self.filter.push(expr.into());
        self
    }

    pub fn with_sort(mut self, rule: impl Into<String>) -> Self {
        self.sort.push(rule.into());
        self
    }

    /// Highlight `field` in the formatted copy of each hit.
    pub fn with_highlight(
        mut self,
        field: impl Into<String>,
        pre_tag: impl Into<String>,
        post_tag: impl Into<String>,
    ) -> Self {
        self.attributes_to_highlight.push(field.into());
        self.highlight_pre_tag = Some(pre_tag.into());
        self.highlight_post_tag = Some(post_tag.into());
        self
    }

    pub fn with_ranking_score(mut self) -> Self {
        self.show_ranking_score = true;
        self
    }
}

/// Highlighted copies of a hit's fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_content: Option<String>,
}

/// One document as returned by the index service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexHit {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(rename = "_rankingScore", default, skip_serializing_if = "Option::is_none")]
    pub ranking_score: Option<f64>,
    #[serde(rename = "_formatted", default, skip_serializing_if = "Option::is_none")]
    pub formatted: Option<FormattedFields>,
}

impl IndexHit {
    /// Display content: the highlighted segment field when present, then
    /// the raw content, then the unhighlighted segment field.
    pub fn display_content(&self) -> String {
        self.formatted
            .as_ref()
            .and_then(|f| f.segment_content.clone())
            .or_else(|| self.content.clone())
            .or_else(|| self.segment_content.clone())
            .unwrap_or_default()
    }

    pub fn into_search_hit(self) -> SearchHit {
        let content = self.display_content();
        SearchHit {
            id: self.id,
            title: self.title,
            content,
            relevance_score: self.ranking_score,
            sequence_index: self.sequence_index,
            file_extension: self.file_type,
        }
    }
}

/// Error code the index service reports for a missing index.
pub const CODE_INDEX_NOT_FOUND: &str = "index_not_found";
/// Error code the index service reports when creating an existing index.
pub const CODE_INDEX_ALREADY_EXISTS: &str = "index_already_exists";

/// Failures talking to the index service.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index not found: {0}")]
    NotFound(String),

    #[error("index already exists: {0}")]
    AlreadyExists(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("index service returned {status} ({code}): {message}")]
    Status {
        status: u16,
        code: String,
        message: String,
    },

    #[error("task {uid} failed ({code}): {message}")]
    TaskFailed {
        uid: u64,
        code: String,
        message: String,
    },

    #[error("could not decode index response: {0}")]
    Decode(String),
}

impl IndexError {
    /// A missing index, whether reported directly or by a failed task.
    pub fn is_not_found(&self) -> bool {
        match self {
            IndexError::NotFound(_) => true,
            IndexError::TaskFailed { code, .. } => code == CODE_INDEX_NOT_FOUND,
            _ => false,
        }
    }

    /// An index that already exists, whether reported directly or by a
    /// failed task.
    pub fn is_already_exists(&self) -> bool {
        match self {
            IndexError::AlreadyExists(_) => true,
            IndexError::TaskFailed { code, .. } => code == CODE_INDEX_ALREADY_EXISTS,
            _ => false,
        }
    }

    /// Timeouts, connection failures, and 5xx responses.
    pub fn is_transient(&self) -> bool {
        match self {
            IndexError::Timeout(_) | IndexError::Transport(_) => true,
            IndexError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Read access to the external index, as needed by retrieval.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Run `query` against the index named `index`.
    async fn search(&self, index: &str, query: &SearchQuery) -> Result<Vec<IndexHit>, IndexError>;
}
