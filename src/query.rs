//! Query answering.
//!
//! One turn of a conversation: remember the query, extract keywords with
//! memory-aware recency handling, run the tiered search, rerank by score
//! window, and render the prompt. Search failures never reach the
//! caller. The tiered search is retried once without the document scope,
//! and if that also fails the turn answers with an empty-evidence prompt.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use minerag_core::index::{DocumentIndex, IndexError};
use minerag_core::keywords::{KeywordExtractor, Tokenizer};
use minerag_core::memory::SessionMemory;
use minerag_core::models::SearchHit;
use minerag_core::prompt::{OutputHit, PromptTemplate};
use minerag_core::rerank::{rerank, RerankParams};
use minerag_core::retrieve::{self, tiered_search};

use crate::config::{Config, RetrievalConfig};
use crate::fragments::load_documents;
use crate::sessions::{SessionStore, DEFAULT_SESSION};

/// Message attached to a successful turn that found nothing.
pub const NO_MATCH_MESSAGE: &str = "no matching fragments";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRequest {
    /// Knowledge base label.
    pub kb: String,
    pub query: String,
    /// Conversation id. `None` uses the shared default session.
    pub session: Option<String>,
    /// Restrict retrieval to these source titles.
    pub allowed_ids: Vec<String>,
    /// Clear the session's memory before this turn.
    pub reset: bool,
    /// Render the selected documents whole instead of searching.
    pub full_documents: bool,
}

impl QueryRequest {
    pub fn new(kb: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            kb: kb.into(),
            query: query.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub query: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub result_prompt: String,
    pub hits: Vec<OutputHit>,
}

pub struct QueryService {
    index: Arc<dyn DocumentIndex>,
    extractor: KeywordExtractor,
    sessions: Arc<SessionStore>,
    index_prefix: String,
    retrieval: RetrievalConfig,
    rerank: RerankParams,
    template: PromptTemplate,
}

impl QueryService {
    pub fn new(
        config: &Config,
        index: Arc<dyn DocumentIndex>,
        tokenizer: Arc<dyn Tokenizer>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self {
            index,
            extractor: KeywordExtractor::new(tokenizer).with_params(config.keywords.params()),
            sessions,
            index_prefix: config.index.index_prefix.clone(),
            retrieval: config.retrieval.clone(),
            rerank: config.retrieval.rerank_params(),
            template: PromptTemplate::default(),
        }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    fn index_name(&self, kb: &str) -> String {
        format!("{}{}", self.index_prefix, kb)
    }

    fn respond(&self, query: &str, hits: Vec<SearchHit>) -> QueryResponse {
        let (prompt, output) = self.template.build_prompt(query, &hits);
        QueryResponse {
            query: query.to_string(),
            ok: true,
            message: output.is_empty().then(|| NO_MATCH_MESSAGE.to_string()),
            result_prompt: prompt,
            hits: output,
        }
    }

    /// Answer one turn of `request`.
    pub async fn answer(&self, request: &QueryRequest) -> QueryResponse {
        let query = request.query.trim();
        if query.is_empty() {
            return QueryResponse {
                query: String::new(),
                ok: false,
                message: Some("query must not be empty".to_string()),
                result_prompt: String::new(),
                hits: Vec::new(),
            };
        }

        let session_id = request.session.as_deref().unwrap_or(DEFAULT_SESSION);
        let memory = self.sessions.get_or_create(session_id).await;
        let mut memory = memory.lock().await;
        if request.reset {
            debug!(session = session_id, "session reset");
            memory.reset();
        }

        let index_name = self.index_name(&request.kb);

        if request.full_documents && !request.allowed_ids.is_empty() {
            match load_documents(self.index.as_ref(), &index_name, &request.allowed_ids).await {
                Ok(docs) => {
                    memory.add_query(query);
                    return QueryResponse {
                        query: query.to_string(),
                        ok: true,
                        message: None,
                        result_prompt: self.template.build_full_document_prompt(query, &docs),
                        hits: Vec::new(),
                    };
                }
                Err(e) => {
                    warn!(index = %index_name, error = %e, "loading documents failed, searching instead");
                }
            }
        }

        let opts = self.retrieval.options(request.allowed_ids.clone());
        match retrieve::search(
            self.index.as_ref(),
            &self.extractor,
            &mut memory,
            &index_name,
            query,
            &opts,
        )
        .await
        {
            Ok(hits) => {
                let ranked = rerank(hits, &self.rerank);
                debug!(hits = ranked.len(), "reranked");
                self.respond(query, ranked)
            }
            Err(e) => {
                warn!(index = %index_name, error = %e, "search failed, retrying unrestricted");
                match self.retry(&memory, &index_name).await {
                    Ok(hits) => self.respond(query, hits),
                    Err(e) => {
                        warn!(index = %index_name, error = %e, "retry failed, answering without evidence");
                        self.respond(query, Vec::new())
                    }
                }
            }
        }
    }

    /// Re-run the tiers over what the failed turn already remembered.
    async fn retry(
        &self,
        memory: &SessionMemory,
        index_name: &str,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let text = memory.all_queries();
        let keywords = self.extractor.get_keywords(&text, None).await;
        let history = memory.query_history().join(" ");
        let opts = self.retrieval.options(Vec::new());
        tiered_search(self.index.as_ref(), index_name, &keywords, &history, &opts).await
    }
}

/// Print `response` as JSON or as plain text.
pub fn print_response(response: &QueryResponse, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }
    if let Some(message) = &response.message {
        println!("({})", message);
    }
    for (i, hit) in response.hits.iter().enumerate() {
        println!("{}. [{} #{}] {}", i + 1, hit.title, hit.doc_id, first_line(&hit.content));
    }
    if !response.hits.is_empty() {
        println!();
    }
    println!("{}", response.result_prompt);
    Ok(())
}

fn first_line(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    let mut preview: String = line.chars().take(80).collect();
    if line.chars().count() > 80 {
        preview.push_str("...");
    }
    preview
}

/// `mrag search`: one turn, printed.
pub async fn run_search(service: &QueryService, request: QueryRequest, json: bool) -> Result<()> {
    let response = service.answer(&request).await;
    print_response(&response, json)
}

/// `mrag chat`: read queries from stdin, one per line, in one session.
///
/// `:reset` clears the session; `:quit` or EOF ends the loop.
pub async fn run_chat(service: &QueryService, kb: &str, session: &str, json: bool) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprintln!("chat on '{}' (:reset to forget, :quit to exit)", kb);
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            ":quit" | ":q" => break,
            ":reset" => {
                service.sessions().reset(session).await;
                eprintln!("(session cleared)");
                continue;
            }
            _ => {}
        }
        let request = QueryRequest {
            session: Some(session.to_string()),
            ..QueryRequest::new(kb, line)
        };
        let response = service.answer(&request).await;
        print_response(&response, json)?;
    }
    Ok(())
}
