//! Core data models used throughout minerag.
//!
//! These types represent the fragments written to the external document
//! index during ingestion, and the hits read back from it at query time.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Field holding the fragment's display content.
pub const FIELD_CONTENT: &str = "content";
/// Field holding the normalized content the index searches over.
pub const FIELD_SEGMENT_CONTENT: &str = "segmentContent";
/// Field holding the fragment's source document name.
pub const FIELD_TITLE: &str = "title";
/// Field holding the 1-based position of a fragment within its source.
pub const FIELD_SEQUENCE_INDEX: &str = "sequenceIndex";
/// Field holding the source file extension.
pub const FIELD_FILE_TYPE: &str = "fileType";
/// Primary key of every index document.
pub const FIELD_ID: &str = "id";

/// One chunk of a source document, produced once during ingestion.
///
/// `sequence_index` is gap-free and starts at 1 within a `source_name`.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub id: String,
    pub source_name: String,
    pub sequence_index: u32,
    pub title: String,
    pub raw_content: String,
    pub normalized_content: String,
    pub file_extension: Option<String>,
}

/// Extension of a source name (`"report.final.pdf"` → `"pdf"`).
///
/// Only the last `/`-separated component is considered. Returns `None`
/// when it has no dot or ends with one.
pub fn file_extension(source_name: &str) -> Option<String> {
    let name = source_name.rsplit('/').next().unwrap_or(source_name);
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_string())
    }
}

/// Turn chunk strings into [`Fragment`]s owned by `source_name`.
///
/// Every fragment gets a fresh UUID v4 and a contiguous 1-based
/// `sequence_index` in chunk order.
pub fn build_fragments(source_name: &str, chunks: Vec<String>) -> Vec<Fragment> {
    let extension = file_extension(source_name);
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, content)| Fragment {
            id: Uuid::new_v4().to_string(),
            source_name: source_name.to_string(),
            sequence_index: (i + 1) as u32,
            title: source_name.to_string(),
            normalized_content: content.clone(),
            raw_content: content,
            file_extension: extension.clone(),
        })
        .collect()
}

/// Identifies the knowledge base a fragment is written into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnowledgeBaseRef {
    pub label: String,
    pub name: String,
}

/// Index-ready document shape for a [`Fragment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentRecord {
    pub id: String,
    pub source_name: String,
    pub sequence_index: u32,
    pub title: String,
    pub content: String,
    pub segment_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default)]
    pub knowledge_label: String,
    #[serde(default)]
    pub knowledge_name: String,
}

impl FragmentRecord {
    pub fn from_fragment(fragment: &Fragment, kb: &KnowledgeBaseRef) -> Self {
        Self {
            id: fragment.id.clone(),
            source_name: fragment.source_name.clone(),
            sequence_index: fragment.sequence_index,
            title: fragment.title.clone(),
            content: fragment.raw_content.clone(),
            segment_content: fragment.normalized_content.clone(),
            file_type: fragment.file_extension.clone(),
            knowledge_label: kb.label.clone(),
            knowledge_name: kb.name.clone(),
        }
    }
}

/// Build index-ready records for every chunk of `source_name`.
pub fn build_fragment_records(
    chunks: Vec<String>,
    source_name: &str,
    kb: &KnowledgeBaseRef,
) -> Vec<FragmentRecord> {
    build_fragments(source_name, chunks)
        .iter()
        .map(|f| FragmentRecord::from_fragment(f, kb))
        .collect()
}

/// A ranked hit returned for one query. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub content: String,
    /// The index's native ranking score, when it reported one.
    pub relevance_score: Option<f64>,
    pub sequence_index: Option<u32>,
    pub file_extension: Option<String>,
}

/// How the index treats the terms of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
    /// Every term must be present.
    All,
    /// Terms are dropped from the end until documents match.
    Last,
    /// Rare terms are kept over frequent ones.
    Frequency,
}

/// Configuration of one knowledge-base index in the external service.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDescriptor {
    pub name: String,
    pub searchable_fields: Vec<String>,
    pub filterable_fields: Vec<String>,
    pub sortable_fields: Vec<String>,
    pub displayed_fields: Vec<String>,
    pub ranking_rules: Vec<String>,
    pub pagination_cap: u64,
}

impl IndexDescriptor {
    /// Descriptor for the index backing a knowledge base.
    pub fn for_knowledge_base(name: impl Into<String>, pagination_cap: u64) -> Self {
        let strings = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            name: name.into(),
            searchable_fields: strings(&[FIELD_TITLE, FIELD_SEGMENT_CONTENT]),
            filterable_fields: strings(&[FIELD_TITLE, FIELD_SEQUENCE_INDEX]),
            sortable_fields: strings(&[FIELD_SEQUENCE_INDEX]),
            displayed_fields: strings(&[
                FIELD_ID,
                FIELD_CONTENT,
                FIELD_TITLE,
                FIELD_SEQUENCE_INDEX,
                FIELD_FILE_TYPE,
            ]),
            ranking_rules: strings(&["typo", "words", "attribute", "proximity", "exactness", "sort"]),
            pagination_cap,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("report.final.pdf").as_deref(), Some("pdf"));
        assert_eq!(file_extension("README"), None);
        assert_eq!(file_extension("trailing."), None);
        assert_eq!(file_extension("guide/intro.md").as_deref(), Some("md"));
        assert_eq!(file_extension("v1.2/README"), None);
    }

    #[test]
    fn test_build_fragments_sequence_is_gap_free() {
        let chunks = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let fragments = build_fragments("notes.txt", chunks);
        let seq: Vec<u32> = fragments.iter().map(|f| f.sequence_index).collect();
        assert_eq!(seq, vec![1, 2, 3]);
        assert!(fragments.iter().all(|f| f.title == "notes.txt"));
        assert!(fragments.iter().all(|f| f.file_extension.as_deref() == Some("txt")));
        assert_ne!(fragments[0].id, fragments[1].id);
    }

    #[test]
    fn test_record_serializes_index_field_names() {
        let kb = KnowledgeBaseRef {
            label: "abc".into(),
            name: "Handbook".into(),
        };
        let records = build_fragment_records(vec!["hello".into()], "a.md", &kb);
        let json = serde_json::to_value(&records[0]).unwrap();
        assert_eq!(json["sequenceIndex"], 1);
        assert_eq!(json["segmentContent"], "hello");
        assert_eq!(json["fileType"], "md");
        assert_eq!(json["knowledgeLabel"], "abc");
    }

    #[test]
    fn test_match_strategy_wire_names() {
        assert_eq!(serde_json::to_value(MatchStrategy::All).unwrap(), "all");
        assert_eq!(serde_json::to_value(MatchStrategy::Last).unwrap(), "last");
    }
}
