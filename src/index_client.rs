//! HTTP client for the external document index service.
//!
//! Speaks the Meilisearch REST API: index CRUD, settings, document batches,
//! search, and asynchronous task polling. Every request carries the
//! configured timeout; a timed-out request fails with
//! [`IndexError::Timeout`] and is not retried here.
//!
//! Errors are classified from the service's JSON error body
//! (`{"message", "code", "type"}`) so callers can tell a missing index
//! from a fault.

use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use minerag_core::index::{
    DocumentIndex, IndexError, IndexHit, SearchQuery, CODE_INDEX_ALREADY_EXISTS,
    CODE_INDEX_NOT_FOUND,
};
use minerag_core::models::{IndexDescriptor, FIELD_ID};

use crate::config::IndexConfig;

/// Handle returned by every asynchronous write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub task_uid: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Enqueued,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl TaskStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Canceled)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TaskError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Task {
    pub uid: u64,
    pub status: TaskStatus,
    #[serde(default)]
    pub error: Option<TaskError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexInfo {
    pub uid: String,
    #[serde(default)]
    pub primary_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub number_of_documents: u64,
    #[serde(default)]
    pub is_indexing: bool,
}

/// Settings body derived from an [`IndexDescriptor`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSettings {
    pub searchable_attributes: Vec<String>,
    pub filterable_attributes: Vec<String>,
    pub sortable_attributes: Vec<String>,
    pub displayed_attributes: Vec<String>,
    pub ranking_rules: Vec<String>,
}

impl From<&IndexDescriptor> for IndexSettings {
    fn from(d: &IndexDescriptor) -> Self {
        Self {
            searchable_attributes: d.searchable_fields.clone(),
            filterable_attributes: d.filterable_fields.clone(),
            sortable_attributes: d.sortable_fields.clone(),
            displayed_attributes: d.displayed_fields.clone(),
            ranking_rules: d.ranking_rules.clone(),
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<IndexHit>,
}

pub struct IndexClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl IndexClient {
    pub fn new(config: &IndexConfig) -> Result<Self> {
        Self::with_base_url(&config.url, config.api_key(), config.timeout())
    }

    pub fn with_base_url(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder, subject: &str) -> Result<Response, IndexError> {
        let resp = req.send().await.map_err(|e| self.transport_error(e))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let text = resp.text().await.unwrap_or_default();
        let body: ErrorBody = serde_json::from_str(&text).unwrap_or(ErrorBody {
            message: text,
            code: String::new(),
        });
        Err(match body.code.as_str() {
            CODE_INDEX_NOT_FOUND => IndexError::NotFound(subject.to_string()),
            CODE_INDEX_ALREADY_EXISTS => IndexError::AlreadyExists(subject.to_string()),
            _ if status == reqwest::StatusCode::NOT_FOUND && body.code.is_empty() => {
                IndexError::NotFound(subject.to_string())
            }
            _ => IndexError::Status {
                status: status.as_u16(),
                code: body.code,
                message: body.message,
            },
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> IndexError {
        if e.is_timeout() {
            IndexError::Timeout(self.timeout)
        } else {
            IndexError::Transport(e.to_string())
        }
    }

    async fn json<T: DeserializeOwned>(&self, resp: Response) -> Result<T, IndexError> {
        let bytes = resp.bytes().await.map_err(|e| self.transport_error(e))?;
        serde_json::from_slice(&bytes).map_err(|e| IndexError::Decode(e.to_string()))
    }

    async fn task(&self, req: RequestBuilder, subject: &str) -> Result<TaskInfo, IndexError> {
        let resp = self.send(req, subject).await?;
        self.json(resp).await
    }

    pub async fn create_index(&self, name: &str) -> Result<TaskInfo, IndexError> {
        let body = serde_json::json!({ "uid": name, "primaryKey": FIELD_ID });
        self.task(self.request(Method::POST, "/indexes").json(&body), name)
            .await
    }

    pub async fn delete_index(&self, name: &str) -> Result<TaskInfo, IndexError> {
        self.task(self.request(Method::DELETE, &format!("/indexes/{}", name)), name)
            .await
    }

    pub async fn get_index(&self, name: &str) -> Result<IndexInfo, IndexError> {
        let resp = self
            .send(self.request(Method::GET, &format!("/indexes/{}", name)), name)
            .await?;
        self.json(resp).await
    }

    pub async fn index_stats(&self, name: &str) -> Result<IndexStats, IndexError> {
        let resp = self
            .send(self.request(Method::GET, &format!("/indexes/{}/stats", name)), name)
            .await?;
        self.json(resp).await
    }

    pub async fn update_settings(
        &self,
        name: &str,
        settings: &IndexSettings,
    ) -> Result<TaskInfo, IndexError> {
        let req = self
            .request(Method::PATCH, &format!("/indexes/{}/settings", name))
            .json(settings);
        self.task(req, name).await
    }

    pub async fn update_pagination(
        &self,
        name: &str,
        max_total_hits: u64,
    ) -> Result<TaskInfo, IndexError> {
        let req = self
            .request(Method::PATCH, &format!("/indexes/{}/settings/pagination", name))
            .json(&serde_json::json!({ "maxTotalHits": max_total_hits }));
        self.task(req, name).await
    }

    pub async fn add_documents<T: Serialize + Sync>(
        &self,
        name: &str,
        documents: &[T],
    ) -> Result<TaskInfo, IndexError> {
        let req = self
            .request(Method::POST, &format!("/indexes/{}/documents", name))
            .json(documents);
        self.task(req, name).await
    }

    pub async fn delete_documents(&self, name: &str, ids: &[String]) -> Result<TaskInfo, IndexError> {
        let req = self
            .request(Method::POST, &format!("/indexes/{}/documents/delete-batch", name))
            .json(ids);
        self.task(req, name).await
    }

    pub async fn get_task(&self, uid: u64) -> Result<Task, IndexError> {
        let subject = format!("task {}", uid);
        let resp = self
            .send(self.request(Method::GET, &format!("/tasks/{}", uid)), &subject)
            .await?;
        self.json(resp).await
    }

    /// Poll `task` every `interval` until it finishes or `limit` elapses.
    ///
    /// A failed or canceled task becomes [`IndexError::TaskFailed`].
    pub async fn wait_for_task(
        &self,
        task: TaskInfo,
        interval: Duration,
        limit: Duration,
    ) -> Result<Task, IndexError> {
        let started = Instant::now();
        loop {
            let current = self.get_task(task.task_uid).await?;
            match current.status {
                TaskStatus::Succeeded => return Ok(current),
                TaskStatus::Failed | TaskStatus::Canceled => {
                    let err = current.error.unwrap_or_default();
                    return Err(IndexError::TaskFailed {
                        uid: current.uid,
                        code: err.code,
                        message: err.message,
                    });
                }
                TaskStatus::Enqueued | TaskStatus::Processing => {}
            }
            if started.elapsed() >= limit {
                return Err(IndexError::Timeout(limit));
            }
            tokio::time::sleep(interval).await;
        }
    }
}

#[async_trait]
impl DocumentIndex for IndexClient {
    async fn search(&self, index: &str, query: &SearchQuery) -> Result<Vec<IndexHit>, IndexError> {
        let req = self
            .request(Method::POST, &format!("/indexes/{}/search", index))
            .json(query);
        let resp = self.send(req, index).await?;
        let parsed: SearchResponse = self.json(resp).await?;
        debug!(index, q = %query.q, hits = parsed.hits.len(), "index search");
        Ok(parsed.hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_descriptor() {
        let d = IndexDescriptor::for_knowledge_base("kb_x", 100_000);
        let json = serde_json::to_value(IndexSettings::from(&d)).unwrap();
        assert_eq!(json["searchableAttributes"], serde_json::json!(["title", "segmentContent"]));
        assert_eq!(json["sortableAttributes"], serde_json::json!(["sequenceIndex"]));
        assert_eq!(json["rankingRules"][5], "sort");
    }

    #[test]
    fn test_task_decoding() {
        let task: Task = serde_json::from_value(serde_json::json!({
            "uid": 7,
            "status": "failed",
            "error": { "message": "exists", "code": "index_already_exists", "type": "invalid_request" }
        }))
        .unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.status.is_finished());
        assert_eq!(task.error.unwrap().code, "index_already_exists");

        let info: TaskInfo =
            serde_json::from_value(serde_json::json!({ "taskUid": 3, "status": "enqueued" })).unwrap();
        assert_eq!(info.task_uid, 3);
    }

    #[test]
    fn test_base_url_trimmed() {
        let c = IndexClient::with_base_url("http://127.0.0.1:7700/", None, Duration::from_secs(1))
            .unwrap();
        assert_eq!(c.base_url(), "http://127.0.0.1:7700");
    }
}
