//! Prompt assembly.
//!
//! Pure formatting: turns a query plus ranked hits (or whole documents)
//! into the text handed to the language model, and mirrors the hits in a
//! stable shape for display.

use serde::Serialize;

use crate::models::{Fragment, SearchHit};

/// Maximum number of documents rendered by [`build_full_document_prompt`].
pub const MAX_FULL_DOCUMENTS: usize = 3;

/// Fixed text surrounding the question and the reference material.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    pub instructions: String,
    pub question_header: String,
    pub question_prefix: String,
    pub references_header: String,
    pub closing: String,
    /// Title used for a selected document with no fragments.
    pub unknown_document: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            instructions: "你是一个有知识的助手，请参考给定的资料来回答用户的问题，若给定资料对你没有帮助请忽略它们。"
                .to_string(),
            question_header: "[问题]".to_string(),
            question_prefix: "用户提问：".to_string(),
            references_header: "[参考资料]".to_string(),
            closing: "请基于上面提供的资料内容回答问题。".to_string(),
            unknown_document: "未知文档".to_string(),
        }
    }
}

/// A hit as shown to the caller next to the generated answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputHit {
    pub title: String,
    pub content: String,
    /// Position of the fragment within its source document.
    pub doc_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
}

impl From<&SearchHit> for OutputHit {
    fn from(hit: &SearchHit) -> Self {
        Self {
            title: hit.title.trim().to_string(),
            content: hit.content.trim().to_string(),
            doc_id: hit
                .sequence_index
                .map(|i| i.to_string())
                .unwrap_or_default(),
            file_type: hit.file_extension.clone(),
        }
    }
}

/// All fragments of one source document, in sequence order.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub title: String,
    pub file_extension: Option<String>,
    pub fragments: Vec<Fragment>,
}

impl PromptTemplate {
    fn header(&self, query: &str) -> String {
        format!(
            "{}\n\n{}\n{}{}\n\n{}\n",
            self.instructions, self.question_header, self.question_prefix, query, self.references_header
        )
    }

    /// Render `hits` as numbered references under `query`.
    pub fn build_prompt(&self, query: &str, hits: &[SearchHit]) -> (String, Vec<OutputHit>) {
        let mut prompt = self.header(query);
        let mut output = Vec::with_capacity(hits.len());
        for (i, hit) in hits.iter().enumerate() {
            let out = OutputHit::from(hit);
            prompt.push_str(&format!("{}. {}\n{}\n\n", i + 1, out.title, out.content));
            output.push(out);
        }
        prompt.push('\n');
        prompt.push_str(&self.closing);
        (prompt, output)
    }

    /// Render up to [`MAX_FULL_DOCUMENTS`] whole documents under `query`.
    pub fn build_full_document_prompt(&self, query: &str, docs: &[SourceDocument]) -> String {
        let parts: Vec<String> = docs
            .iter()
            .take(MAX_FULL_DOCUMENTS)
            .map(|doc| {
                let title = if doc.fragments.is_empty() {
                    self.unknown_document.as_str()
                } else {
                    doc.title.as_str()
                };
                let body = doc
                    .fragments
                    .iter()
                    .map(|f| f.raw_content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                format!(
                    "----- 这是文档 {}.{} 的内容 -----\n{}",
                    title,
                    doc.file_extension.as_deref().unwrap_or(""),
                    body
                )
            })
            .collect();
        format!("{}{}\n\n{}", self.header(query), parts.join("\n\n"), self.closing)
    }
}

/// [`PromptTemplate::build_prompt`] with the default template.
pub fn build_prompt(query: &str, hits: &[SearchHit]) -> (String, Vec<OutputHit>) {
    PromptTemplate::default().build_prompt(query, hits)
}

/// [`PromptTemplate::build_full_document_prompt`] with the default template.
pub fn build_full_document_prompt(query: &str, docs: &[SourceDocument]) -> String {
    PromptTemplate::default().build_full_document_prompt(query, docs)
}
