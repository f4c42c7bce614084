//! Segmentation worker pool.
//!
//! A fixed number of long-lived child processes segment text on behalf of
//! any number of concurrent callers. Each worker speaks newline-delimited
//! JSON over stdio:
//!
//! ```text
//! → {"text": "上海天气怎么样", "stopWords": ["怎么样"]}
//! ← {"result": "上海 天气"}        or        {"error": "..."}
//! ```
//!
//! # Dispatch
//!
//! All pool state (workers, busy flags, the FIFO queue) is owned by one
//! dispatcher task. Callers send it requests over a channel; per-worker
//! reader tasks send it output lines and exit notices. A request goes to
//! the first idle worker, or waits in the queue. Writes to a worker's
//! stdin happen on that worker's own writer task, so a worker that stops
//! reading never stalls dispatch to the others.
//!
//! # Fault handling
//!
//! - A worker that exits, or whose stdin breaks, fails its in-flight
//!   request and is replaced immediately.
//! - An `{"error"}` reply fails only that request; the worker stays.
//! - Output lines that are not valid JSON are logged and skipped.
//! - If no worker can be spawned at all, queued requests are rejected
//!   rather than left waiting.
//!
//! Worker stderr is forwarded to `tracing::warn!`.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

/// Why a segmentation request failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SegmentError {
    #[error("segmentation worker reported an error: {0}")]
    Worker(String),

    #[error("segmentation worker exited before replying")]
    WorkerExited,

    #[error("could not write to segmentation worker: {0}")]
    Io(String),

    #[error("no segmentation worker is available")]
    Unavailable,

    #[error("segmentation pool has shut down")]
    Closed,
}

/// How to launch the workers.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub size: usize,
    pub command: PathBuf,
    pub args: Vec<String>,
}

/// A point-in-time view of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub workers: usize,
    pub busy: usize,
    pub queued: usize,
    /// Workers spawned over the pool's lifetime, replacements included.
    pub spawned: u64,
}

#[derive(Serialize)]
struct WorkerRequest<'a> {
    text: &'a str,
    #[serde(rename = "stopWords")]
    stop_words: &'a [String],
}

#[derive(Deserialize)]
struct WorkerReply {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

type Reply = oneshot::Sender<Result<String, SegmentError>>;

struct Job {
    text: String,
    stop_words: Arc<Vec<String>>,
    reply: Reply,
}

enum Request {
    Segment(Job),
    Stats(oneshot::Sender<PoolStats>),
    Shutdown(oneshot::Sender<()>),
}

enum Event {
    Line { worker: u64, line: String },
    Closed { worker: u64 },
    WriteFailed { worker: u64, error: String },
}

struct Worker {
    id: u64,
    child: Child,
    /// Request lines for the worker's writer task.
    input: mpsc::UnboundedSender<String>,
    current: Option<Reply>,
}

/// Handle to a running pool. Cheap to clone.
#[derive(Clone)]
pub struct SegmentPool {
    requests: mpsc::UnboundedSender<Request>,
    size: usize,
}

impl SegmentPool {
    /// Spawn `config.size` workers and the dispatcher task.
    ///
    /// Must be called inside a tokio runtime. Fails only if not a single
    /// worker could be started.
    pub fn start(config: PoolConfig) -> Result<Self> {
        if config.size == 0 {
            bail!("segmentation pool size must be > 0");
        }
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (ev_tx, ev_rx) = mpsc::unbounded_channel();

        let mut dispatcher = Dispatcher {
            config: config.clone(),
            workers: Vec::with_capacity(config.size),
            queue: VecDeque::new(),
            events: ev_tx,
            next_id: 0,
        };
        let mut last_err = None;
        for _ in 0..config.size {
            if let Err(e) = dispatcher.spawn_worker() {
                last_err = Some(e);
            }
        }
        if dispatcher.workers.is_empty() {
            let e = last_err.unwrap_or_else(|| anyhow::anyhow!("no workers started"));
            return Err(e.context(format!(
                "Failed to start segmentation worker: {}",
                config.command.display()
            )));
        }
        if dispatcher.workers.len() < config.size {
            warn!(
                started = dispatcher.workers.len(),
                wanted = config.size,
                "segmentation pool started short"
            );
        }

        tokio::spawn(dispatcher.run(req_rx, ev_rx));
        Ok(Self {
            requests: req_tx,
            size: config.size,
        })
    }

    /// Configured number of workers.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Segment `text`, waiting for a free worker if all are busy.
    pub async fn segment(
        &self,
        text: &str,
        stop_words: Arc<Vec<String>>,
    ) -> Result<String, SegmentError> {
        let (tx, rx) = oneshot::channel();
        let job = Job {
            text: text.to_string(),
            stop_words,
            reply: tx,
        };
        self.requests
            .send(Request::Segment(job))
            .map_err(|_| SegmentError::Closed)?;
        rx.await.unwrap_or(Err(SegmentError::Closed))
    }

    pub async fn stats(&self) -> Option<PoolStats> {
        let (tx, rx) = oneshot::channel();
        self.requests.send(Request::Stats(tx)).ok()?;
        rx.await.ok()
    }

    /// Reject queued requests, stop every worker, and end the dispatcher.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.requests.send(Request::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

struct Dispatcher {
    config: PoolConfig,
    workers: Vec<Worker>,
    queue: VecDeque<Job>,
    events: mpsc::UnboundedSender<Event>,
    next_id: u64,
}

impl Dispatcher {
    async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<Request>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        loop {
            tokio::select! {
                req = requests.recv() => match req {
                    Some(Request::Segment(job)) => {
                        self.top_up();
                        self.queue.push_back(job);
                    }
                    Some(Request::Stats(tx)) => {
                        let _ = tx.send(self.stats());
                    }
                    Some(Request::Shutdown(tx)) => {
                        self.stop_all();
                        let _ = tx.send(());
                        return;
                    }
                    None => {
                        self.stop_all();
                        return;
                    }
                },
                Some(event) = events.recv() => match event {
                    Event::Line { worker, line } => self.on_line(worker, &line),
                    Event::Closed { worker } => self.on_closed(worker),
                    Event::WriteFailed { worker, error } => {
                        self.on_write_failed(worker, error)
                    }
                },
            }
            self.dispatch();
        }
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.workers.len(),
            busy: self.workers.iter().filter(|w| w.current.is_some()).count(),
            queued: self.queue.len(),
            spawned: self.next_id,
        }
    }

    fn spawn_worker(&mut self) -> Result<()> {
        let mut child = Command::new(&self.config.command)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to capture worker stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to capture worker stdout"))?;

        let id = self.next_id;
        self.next_id += 1;

        let (input, mut lines) = mpsc::unbounded_channel::<String>();
        let events = self.events.clone();
        tokio::spawn(async move {
            while let Some(line) = lines.recv().await {
                let written = async {
                    stdin.write_all(line.as_bytes()).await?;
                    stdin.flush().await
                }
                .await;
                if let Err(e) = written {
                    let _ = events.send(Event::WriteFailed {
                        worker: id,
                        error: e.to_string(),
                    });
                    return;
                }
            }
        });

        let events = self.events.clone();
        tokio::spawn(async move {
            read_lines(stdout, |line| {
                events.send(Event::Line { worker: id, line }).is_ok()
            })
            .await;
            let _ = events.send(Event::Closed { worker: id });
        });
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                read_lines(stderr, |line| {
                    warn!(worker = id, "{}", line);
                    true
                })
                .await;
            });
        }

        debug!(worker = id, "segmentation worker started");
        self.workers.push(Worker {
            id,
            child,
            input,
            current: None,
        });
        Ok(())
    }

    /// Bring the pool back to its configured size.
    fn top_up(&mut self) {
        while self.workers.len() < self.config.size {
            if let Err(e) = self.spawn_worker() {
                error!(error = %e, "failed to spawn segmentation worker");
                break;
            }
        }
    }

    fn on_line(&mut self, id: u64, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        let Some(worker) = self.workers.iter_mut().find(|w| w.id == id) else {
            return;
        };
        let reply: WorkerReply = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                warn!(worker = id, error = %e, "skipping malformed worker output");
                return;
            }
        };
        let Some(tx) = worker.current.take() else {
            warn!(worker = id, "worker replied with no request in flight");
            return;
        };
        let outcome = match (reply.result, reply.error) {
            (_, Some(err)) => Err(SegmentError::Worker(err)),
            (Some(result), None) => Ok(result),
            (None, None) => Err(SegmentError::Worker("empty reply".to_string())),
        };
        let _ = tx.send(outcome);
    }

    fn on_closed(&mut self, id: u64) {
        let Some(pos) = self.workers.iter().position(|w| w.id == id) else {
            return;
        };
        let worker = self.workers.swap_remove(pos);
        error!(worker = id, "segmentation worker exited");
        retire(worker, SegmentError::WorkerExited);
        self.top_up();
        self.reject_if_empty();
    }

    fn on_write_failed(&mut self, id: u64, error: String) {
        let Some(pos) = self.workers.iter().position(|w| w.id == id) else {
            return;
        };
        let worker = self.workers.swap_remove(pos);
        warn!(worker = id, error = %error, "segmentation worker stdin closed");
        retire(worker, SegmentError::Io(error));
        self.top_up();
        self.reject_if_empty();
    }

    fn reject_if_empty(&mut self) {
        if !self.workers.is_empty() {
            return;
        }
        for job in self.queue.drain(..) {
            let _ = job.reply.send(Err(SegmentError::Unavailable));
        }
    }

    /// Hand queued jobs to idle workers, first idle worker first.
    fn dispatch(&mut self) {
        self.reject_if_empty();
        while !self.queue.is_empty() {
            let Some(idx) = self.workers.iter().position(|w| w.current.is_none()) else {
                return;
            };
            let Some(job) = self.queue.pop_front() else {
                return;
            };
            let payload = match encode_request(&job) {
                Ok(p) => p,
                Err(e) => {
                    let _ = job.reply.send(Err(SegmentError::Io(e.to_string())));
                    continue;
                }
            };

            let worker = &mut self.workers[idx];
            worker.current = Some(job.reply);
            if worker.input.send(payload).is_err() {
                let worker = self.workers.swap_remove(idx);
                warn!(worker = worker.id, "segmentation worker writer is gone");
                retire(worker, SegmentError::Io("worker input closed".to_string()));
                self.top_up();
                self.reject_if_empty();
            }
        }
    }

    fn stop_all(&mut self) {
        for job in self.queue.drain(..) {
            let _ = job.reply.send(Err(SegmentError::Closed));
        }
        for worker in std::mem::take(&mut self.workers) {
            retire(worker, SegmentError::Closed);
        }
    }
}

/// Fail the worker's in-flight request and reap the process.
fn retire(mut worker: Worker, reason: SegmentError) {
    if let Some(tx) = worker.current.take() {
        let _ = tx.send(Err(reason));
    }
    let _ = worker.child.start_kill();
    let id = worker.id;
    tokio::spawn(async move {
        if let Ok(status) = worker.child.wait().await {
            debug!(worker = id, %status, "segmentation worker reaped");
        }
    });
}

fn encode_request(job: &Job) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(&WorkerRequest {
        text: &job.text,
        stop_words: &job.stop_words,
    })?;
    line.push('\n');
    Ok(line)
}

/// Feed each complete line to `on_line` until EOF, a read error, or
/// `on_line` returning false. Invalid UTF-8 is replaced, not fatal.
async fn read_lines<R, F>(reader: R, mut on_line: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(String) -> bool,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => return,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\n', '\r'])
                    .to_string();
                if !on_line(line) {
                    return;
                }
            }
            Err(_) => return,
        }
    }
}
