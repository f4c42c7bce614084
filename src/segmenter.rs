//! Text segmentation front end.
//!
//! [`Segmenter`] strips punctuation, passes Latin-dominant text through
//! untouched, and sends everything else to the worker pool along with the
//! configured stop words. It implements the core [`Tokenizer`] trait, so
//! the keyword extractor can use it directly.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use minerag_core::keywords::Tokenizer;
use minerag_core::text::{is_mostly_latin, strip_punctuation};

use crate::config::SegmentationConfig;
use crate::segment_pool::{PoolConfig, SegmentPool};

/// Argument that switches the `mrag` binary into worker mode.
pub const WORKER_SUBCOMMAND: &str = "segment-worker";

/// Read one stop word per line. A missing or unreadable file yields an
/// empty list.
pub fn load_stop_words(path: Option<&Path>) -> Vec<String> {
    let Some(path) = path else {
        return Vec::new();
    };
    match std::fs::read_to_string(path) {
        Ok(content) => content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "stop words unavailable, using none");
            Vec::new()
        }
    }
}

/// Pool configuration for `config`, defaulting the worker to this
/// executable's `segment-worker` mode.
pub fn pool_config(config: &SegmentationConfig) -> Result<PoolConfig> {
    let (command, args) = match &config.worker_command {
        Some(cmd) => (cmd.clone(), config.worker_args.clone()),
        None => (
            std::env::current_exe()?,
            vec![WORKER_SUBCOMMAND.to_string()],
        ),
    };
    Ok(PoolConfig {
        size: config.pool_size,
        command,
        args,
    })
}

#[derive(Clone)]
pub struct Segmenter {
    pool: SegmentPool,
    stop_words: Arc<Vec<String>>,
}

impl Segmenter {
    pub fn new(pool: SegmentPool, stop_words: Vec<String>) -> Self {
        Self {
            pool,
            stop_words: Arc::new(stop_words),
        }
    }

    /// Start a pool and load stop words as configured.
    pub fn from_config(config: &SegmentationConfig) -> Result<Self> {
        let pool = SegmentPool::start(pool_config(config)?)?;
        let stop_words = load_stop_words(config.stop_words_path.as_deref());
        debug!(stop_words = stop_words.len(), pool_size = pool.size(), "segmenter ready");
        Ok(Self::new(pool, stop_words))
    }

    pub fn pool(&self) -> &SegmentPool {
        &self.pool
    }

    /// Space-joined tokens of `text`.
    pub async fn segment(&self, text: &str) -> Result<String> {
        let cleaned = strip_punctuation(text);
        if cleaned.is_empty() {
            return Ok(String::new());
        }
        if is_mostly_latin(&cleaned) {
            return Ok(cleaned);
        }
        Ok(self.pool.segment(&cleaned, self.stop_words.clone()).await?)
    }

    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}

#[async_trait]
impl Tokenizer for Segmenter {
    async fn tokenize(&self, text: &str) -> Result<String> {
        self.segment(text).await
    }
}
