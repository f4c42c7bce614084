//! A fake index service speaking enough of the Meilisearch API for the
//! client, lifecycle, ingestion, and query tests. Storage and search are
//! delegated to the core in-memory index.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use minerag_core::index::memory::InMemoryIndex;
use minerag_core::index::{DocumentIndex, SearchQuery};
use minerag_core::models::FragmentRecord;

struct TaskState {
    status: &'static str,
    error: Option<(String, String)>,
    polls: u32,
}

#[derive(Default)]
pub struct Inner {
    pub index: InMemoryIndex,
    tasks: Mutex<HashMap<u64, TaskState>>,
    next_task: AtomicU64,
    pub settings: Mutex<Vec<(String, Value)>>,
    pub pagination: Mutex<Vec<(String, Value)>>,
    pub delete_batches: Mutex<Vec<usize>>,
    pub auth_headers: Mutex<Vec<Option<String>>>,
    pub fail_settings: AtomicBool,
    pub search_delay_ms: AtomicU64,
    pub search_status: Mutex<Option<u16>>,
}

#[derive(Clone)]
pub struct FakeIndex {
    pub inner: Arc<Inner>,
    pub url: String,
}

type Reply = (StatusCode, Json<Value>);

fn error_reply(status: StatusCode, code: &str, message: &str) -> Reply {
    (
        status,
        Json(json!({
            "message": message,
            "code": code,
            "type": "invalid_request",
            "link": format!("https://docs.meilisearch.com/errors#{}", code),
        })),
    )
}

impl Inner {
    fn enqueue(&self, error: Option<(&str, &str)>) -> Reply {
        let uid = self.next_task.fetch_add(1, Ordering::SeqCst);
        let state = TaskState {
            status: if error.is_some() { "failed" } else { "succeeded" },
            error: error.map(|(c, m)| (c.to_string(), m.to_string())),
            polls: 0,
        };
        self.tasks.lock().unwrap().insert(uid, state);
        (
            StatusCode::ACCEPTED,
            Json(json!({ "taskUid": uid, "status": "enqueued" })),
        )
    }

    fn record_auth(&self, headers: &HeaderMap) {
        let value = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.auth_headers.lock().unwrap().push(value);
    }
}

async fn create_index(State(s): State<Arc<Inner>>, headers: HeaderMap, Json(body): Json<Value>) -> Reply {
    s.record_auth(&headers);
    let uid = body["uid"].as_str().unwrap_or_default().to_string();
    if s.index.has_index(&uid) {
        return s.enqueue(Some(("index_already_exists", "Index already exists.")));
    }
    s.index.create_index(&uid);
    s.enqueue(None)
}

async fn get_index(State(s): State<Arc<Inner>>, Path(uid): Path<String>) -> Reply {
    if s.index.has_index(&uid) {
        (StatusCode::OK, Json(json!({ "uid": uid, "primaryKey": "id" })))
    } else {
        error_reply(StatusCode::NOT_FOUND, "index_not_found", "Index not found.")
    }
}

async fn delete_index(State(s): State<Arc<Inner>>, Path(uid): Path<String>) -> Reply {
    if s.index.drop_index(&uid) {
        s.enqueue(None)
    } else {
        s.enqueue(Some(("index_not_found", "Index not found.")))
    }
}

async fn index_stats(State(s): State<Arc<Inner>>, Path(uid): Path<String>) -> Reply {
    match s.index.records(&uid) {
        Some(records) => (
            StatusCode::OK,
            Json(json!({ "numberOfDocuments": records.len(), "isIndexing": false })),
        ),
        None => error_reply(StatusCode::NOT_FOUND, "index_not_found", "Index not found."),
    }
}

async fn update_settings(
    State(s): State<Arc<Inner>>,
    Path(uid): Path<String>,
    Json(body): Json<Value>,
) -> Reply {
    s.settings.lock().unwrap().push((uid, body));
    if s.fail_settings.load(Ordering::SeqCst) {
        return s.enqueue(Some(("invalid_settings_ranking_rules", "Invalid ranking rule.")));
    }
    s.enqueue(None)
}

async fn update_pagination(
    State(s): State<Arc<Inner>>,
    Path(uid): Path<String>,
    Json(body): Json<Value>,
) -> Reply {
    s.pagination.lock().unwrap().push((uid, body));
    s.enqueue(None)
}

async fn add_documents(
    State(s): State<Arc<Inner>>,
    Path(uid): Path<String>,
    Json(docs): Json<Vec<FragmentRecord>>,
) -> Reply {
    s.index.insert(&uid, docs);
    s.enqueue(None)
}

async fn delete_batch(
    State(s): State<Arc<Inner>>,
    Path(uid): Path<String>,
    Json(ids): Json<Vec<String>>,
) -> Reply {
    s.delete_batches.lock().unwrap().push(ids.len());
    s.index.remove(&uid, &ids);
    s.enqueue(None)
}

async fn search(
    State(s): State<Arc<Inner>>,
    Path(uid): Path<String>,
    Json(query): Json<SearchQuery>,
) -> Reply {
    let delay = s.search_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    let forced = *s.search_status.lock().unwrap();
    if let Some(status) = forced {
        let status = StatusCode::from_u16(status).unwrap();
        return error_reply(status, "internal", "Forced failure.");
    }
    match s.index.search(&uid, &query).await {
        Ok(hits) => (StatusCode::OK, Json(json!({ "hits": hits, "query": query.q }))),
        Err(e) if e.is_not_found() => {
            error_reply(StatusCode::NOT_FOUND, "index_not_found", "Index not found.")
        }
        Err(e) => error_reply(StatusCode::INTERNAL_SERVER_ERROR, "internal", &e.to_string()),
    }
}

async fn get_task(State(s): State<Arc<Inner>>, Path(uid): Path<u64>) -> Reply {
    let mut tasks = s.tasks.lock().unwrap();
    let Some(task) = tasks.get_mut(&uid) else {
        return error_reply(StatusCode::NOT_FOUND, "task_not_found", "Task not found.");
    };
    task.polls += 1;
    // First poll reports the task as still running.
    if task.polls == 1 {
        return (StatusCode::OK, Json(json!({ "uid": uid, "status": "processing" })));
    }
    let mut body = json!({ "uid": uid, "status": task.status });
    if let Some((code, message)) = &task.error {
        body["error"] = json!({ "code": code, "message": message, "type": "invalid_request" });
    }
    (StatusCode::OK, Json(body))
}

impl FakeIndex {
    pub async fn start() -> Self {
        let inner = Arc::new(Inner::default());
        let app = Router::new()
            .route("/indexes", post(create_index))
            .route("/indexes/{uid}", get(get_index).delete(delete_index))
            .route("/indexes/{uid}/stats", get(index_stats))
            .route("/indexes/{uid}/settings", patch(update_settings))
            .route("/indexes/{uid}/settings/pagination", patch(update_pagination))
            .route("/indexes/{uid}/documents", post(add_documents))
            .route("/indexes/{uid}/documents/delete-batch", post(delete_batch))
            .route("/indexes/{uid}/search", post(search))
            .route("/tasks/{uid}", get(get_task))
            .with_state(inner.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            inner,
            url: format!("http://{}", addr),
        }
    }
}
