//! Fragment listing and source deletion.
//!
//! Both walk every fragment of one title with an empty-query filtered
//! search, paging in sequence order. A missing index is an empty
//! knowledge base, not an error.

use anyhow::{Context, Result};
use tracing::info;

use minerag_core::index::{DocumentIndex, IndexError, IndexHit, SearchQuery};
use minerag_core::models::{file_extension, Fragment, FIELD_SEQUENCE_INDEX};
use minerag_core::prompt::SourceDocument;
use minerag_core::retrieve::title_filter;

use crate::lifecycle::IndexManager;

/// Page size used when listing fragments.
pub const PAGE_SIZE: usize = 1000;
/// Number of ids per delete request.
pub const DELETE_BATCH: usize = 100;

fn into_fragment(hit: IndexHit) -> Fragment {
    let raw = hit.content.clone().unwrap_or_default();
    Fragment {
        normalized_content: hit.segment_content.clone().unwrap_or_else(|| raw.clone()),
        raw_content: raw,
        sequence_index: hit.sequence_index.unwrap_or_default(),
        file_extension: hit.file_type.clone().or_else(|| file_extension(&hit.title)),
        source_name: hit.title.clone(),
        title: hit.title,
        id: hit.id,
    }
}

/// Every fragment of `title` in `index_name`, ordered by sequence index.
pub async fn list_fragments(
    index: &dyn DocumentIndex,
    index_name: &str,
    title: &str,
) -> Result<Vec<Fragment>, IndexError> {
    let Some(filter) = title_filter(&[title.to_string()]) else {
        return Ok(Vec::new());
    };

    let mut fragments = Vec::new();
    let mut offset = 0;
    loop {
        let query = SearchQuery::new("")
            .with_filter(filter.clone())
            .with_sort(format!("{}:asc", FIELD_SEQUENCE_INDEX))
            .with_limit(PAGE_SIZE)
            .with_offset(offset);
        let page = match index.search(index_name, &query).await {
            Ok(page) => page,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let n = page.len();
        fragments.extend(page.into_iter().map(into_fragment));
        if n < PAGE_SIZE {
            break;
        }
        offset += n;
    }
    Ok(fragments)
}

/// Whole documents for `titles`, for the full-document prompt.
pub async fn load_documents(
    index: &dyn DocumentIndex,
    index_name: &str,
    titles: &[String],
) -> Result<Vec<SourceDocument>, IndexError> {
    let mut docs = Vec::with_capacity(titles.len());
    for title in titles {
        let fragments = list_fragments(index, index_name, title).await?;
        docs.push(SourceDocument {
            title: title.clone(),
            file_extension: fragments
                .first()
                .and_then(|f| f.file_extension.clone())
                .or_else(|| file_extension(title)),
            fragments,
        });
    }
    Ok(docs)
}

/// Delete every fragment of `title` from knowledge base `kb`.
///
/// Returns the number of fragments removed.
pub async fn delete_source(manager: &IndexManager, kb: &str, title: &str) -> Result<usize> {
    let index_name = manager.index_name(kb);
    let client = manager.client();
    let ids: Vec<String> = list_fragments(client.as_ref(), &index_name, title)
        .await
        .with_context(|| format!("Failed to list fragments of '{}'", title))?
        .into_iter()
        .map(|f| f.id)
        .collect();

    for batch in ids.chunks(DELETE_BATCH) {
        let task = client
            .delete_documents(&index_name, batch)
            .await
            .with_context(|| format!("Failed to delete fragments of '{}'", title))?;
        manager.wait(task).await?;
    }

    info!(index = %index_name, title, deleted = ids.len(), "source deleted");
    Ok(ids.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use minerag_core::index::memory::InMemoryIndex;
    use minerag_core::models::{build_fragment_records, KnowledgeBaseRef};

    #[tokio::test]
    async fn test_list_fragments_in_order() {
        let index = InMemoryIndex::new();
        let kb = KnowledgeBaseRef::default();
        index.insert(
            "kb_t",
            build_fragment_records(vec!["one".into(), "two".into(), "three".into()], "a.txt", &kb),
        );
        index.insert("kb_t", build_fragment_records(vec!["other".into()], "b.txt", &kb));

        let frags = list_fragments(&index, "kb_t", "a.txt").await.unwrap();
        let bodies: Vec<&str> = frags.iter().map(|f| f.raw_content.as_str()).collect();
        assert_eq!(bodies, vec!["one", "two", "three"]);
        assert_eq!(frags[2].sequence_index, 3);
        assert_eq!(frags[0].file_extension.as_deref(), Some("txt"));
    }

    #[tokio::test]
    async fn test_missing_index_lists_nothing() {
        let index = InMemoryIndex::new();
        assert!(list_fragments(&index, "kb_none", "a.txt").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_paging_walks_past_first_page() {
        let index = InMemoryIndex::new();
        let chunks: Vec<String> = (0..PAGE_SIZE + 5).map(|i| format!("c{}", i)).collect();
        index.insert(
            "kb_t",
            build_fragment_records(chunks, "big.txt", &KnowledgeBaseRef::default()),
        );
        let frags = list_fragments(&index, "kb_t", "big.txt").await.unwrap();
        assert_eq!(frags.len(), PAGE_SIZE + 5);
        assert_eq!(frags.last().unwrap().raw_content, format!("c{}", PAGE_SIZE + 4));
        assert_eq!(index.queries().len(), 2);
    }

    #[tokio::test]
    async fn test_load_documents() {
        let index = InMemoryIndex::new();
        index.insert(
            "kb_t",
            build_fragment_records(vec!["x".into()], "a.md", &KnowledgeBaseRef::default()),
        );
        let docs = load_documents(&index, "kb_t", &["a.md".into(), "gone.pdf".into()])
            .await
            .unwrap();
        assert_eq!(docs[0].file_extension.as_deref(), Some("md"));
        assert!(docs[1].fragments.is_empty());
        assert_eq!(docs[1].file_extension.as_deref(), Some("pdf"));
    }
}
