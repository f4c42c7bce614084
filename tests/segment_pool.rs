//! Segmentation pool against real child processes: small `sh` scripts
//! for fault injection, and the crate's own `mrag segment-worker`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use minerag::segment_pool::{PoolConfig, SegmentError, SegmentPool};
use minerag::segmenter::{Segmenter, WORKER_SUBCOMMAND};

fn sh_pool(size: usize, script: &str) -> SegmentPool {
    SegmentPool::start(PoolConfig {
        size,
        command: PathBuf::from("sh"),
        args: vec!["-c".to_string(), script.to_string()],
    })
    .unwrap()
}

fn mrag_pool(size: usize) -> SegmentPool {
    SegmentPool::start(PoolConfig {
        size,
        command: PathBuf::from(env!("CARGO_BIN_EXE_mrag")),
        args: vec![WORKER_SUBCOMMAND.to_string()],
    })
    .unwrap()
}

fn no_stop_words() -> Arc<Vec<String>> {
    Arc::new(Vec::new())
}

const COUNTER: &str = r#"i=0; while IFS= read -r line; do i=$((i+1)); echo "{\"result\":\"$i\"}"; done"#;
const CRASHER: &str = r#"IFS= read -r line; exit 3"#;
const REFUSER: &str = r#"while IFS= read -r line; do echo '{"error":"bad input"}'; done"#;
/// Reads only the first bytes of its request: stalls on anything starting
/// with BIG, answers anything else once.
const STALLER: &str = r#"p=$(head -c 12); case "$p" in *BIG*) sleep 30 ;; *) echo '{"result":"ok"}'; sleep 30 ;; esac"#;
const NOISY: &str =
    r#"while IFS= read -r line; do echo 'not json'; echo 'worker log' >&2; echo '{"result":"fine"}'; done"#;

#[tokio::test]
async fn test_requests_are_served_in_fifo_order() {
    let pool = sh_pool(1, COUNTER);
    let (a, b, c) = tokio::join!(
        pool.segment("a", no_stop_words()),
        pool.segment("b", no_stop_words()),
        pool.segment("c", no_stop_words()),
    );
    assert_eq!(a.unwrap(), "1");
    assert_eq!(b.unwrap(), "2");
    assert_eq!(c.unwrap(), "3");
    pool.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_requests_share_fixed_workers() {
    let pool = sh_pool(2, COUNTER);
    let mut handles = Vec::new();
    for i in 0..10 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            pool.segment(&format!("text {}", i), Arc::new(Vec::new())).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    let stats = pool.stats().await.unwrap();
    assert_eq!(stats.workers, 2);
    assert_eq!(stats.spawned, 2);
    assert_eq!(stats.queued, 0);
    pool.shutdown().await;
}

#[tokio::test]
async fn test_crashed_worker_fails_request_and_is_replaced() {
    let pool = sh_pool(1, CRASHER);

    let err = pool.segment("x", no_stop_words()).await.unwrap_err();
    assert_eq!(err, SegmentError::WorkerExited);

    let stats = pool.stats().await.unwrap();
    assert_eq!(stats.workers, 1);
    assert_eq!(stats.spawned, 2);

    // The replacement serves (and crashes on) the next request.
    let err = pool.segment("y", no_stop_words()).await.unwrap_err();
    assert_eq!(err, SegmentError::WorkerExited);
    pool.shutdown().await;
}

#[tokio::test]
async fn test_worker_error_reply_keeps_worker() {
    let pool = sh_pool(1, REFUSER);
    for _ in 0..2 {
        let err = pool.segment("x", no_stop_words()).await.unwrap_err();
        assert_eq!(err, SegmentError::Worker("bad input".to_string()));
    }
    assert_eq!(pool.stats().await.unwrap().spawned, 1);
    pool.shutdown().await;
}

#[tokio::test]
async fn test_malformed_output_is_skipped() {
    let pool = sh_pool(1, NOISY);
    assert_eq!(pool.segment("x", no_stop_words()).await.unwrap(), "fine");
    assert_eq!(pool.segment("y", no_stop_words()).await.unwrap(), "fine");
    pool.shutdown().await;
}

#[tokio::test]
async fn test_stalled_worker_does_not_block_others() {
    let pool = sh_pool(2, STALLER);

    // Far larger than a pipe buffer, so writing it never completes.
    let big = format!("BIG{}", "x".repeat(1 << 20));
    let stalled = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.segment(&big, Arc::new(Vec::new())).await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;

    let small = tokio::time::timeout(Duration::from_secs(5), pool.segment("small", no_stop_words()))
        .await
        .expect("dispatcher blocked by a stalled worker");
    assert_eq!(small.unwrap(), "ok");

    let stats = pool.stats().await.unwrap();
    assert_eq!(stats.busy, 1);
    stalled.abort();
    pool.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_pool() {
    let pool = sh_pool(1, COUNTER);
    pool.shutdown().await;
    let err = pool.segment("x", no_stop_words()).await.unwrap_err();
    assert_eq!(err, SegmentError::Closed);
    assert!(pool.stats().await.is_none());
}

#[tokio::test]
async fn test_builtin_worker_segments_cjk() {
    let pool = mrag_pool(1);
    let out = pool.segment("上海天气", no_stop_words()).await.unwrap();
    assert_eq!(out.replace(' ', ""), "上海天气");

    let stop = Arc::new(vec!["的".to_string()]);
    let out = pool.segment("我们的天气", stop).await.unwrap();
    assert!(!out.split(' ').any(|t| t == "的"));
    pool.shutdown().await;
}

#[tokio::test]
async fn test_segmenter_bypasses_pool_for_latin() {
    // Every pooled request would come back as "1", "2", ...
    let segmenter = Segmenter::new(sh_pool(1, COUNTER), Vec::new());
    assert_eq!(segmenter.segment("Hello, world!").await.unwrap(), "Hello world");
    assert_eq!(segmenter.segment("？！").await.unwrap(), "");
    assert_eq!(segmenter.segment("上海天气").await.unwrap(), "1");
    segmenter.shutdown().await;
}

#[tokio::test]
async fn test_segmenter_with_builtin_worker_and_stop_words() {
    let segmenter = Segmenter::new(mrag_pool(2), vec!["怎么样".to_string()]);
    let out = segmenter.segment("上海天气怎么样？").await.unwrap();
    assert!(!out.split(' ').any(|t| t == "怎么样"));
    assert!(out.contains("上海"));
    segmenter.shutdown().await;
}
