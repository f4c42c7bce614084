//! TOML configuration.
//!
//! Every section except `[index]` is optional and falls back to serde
//! defaults. [`load_config`] parses and validates; [`Config::minimal`]
//! builds a default configuration for a given index URL.
//!
//! ```toml
//! [index]
//! url = "http://127.0.0.1:7700"
//!
//! [segmentation]
//! pool_size = 2
//! stop_words_path = "./config/stop_words.txt"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use minerag_core::chunk::{ChunkOptions, DEFAULT_MAX_LEN_CJK, DEFAULT_MAX_LEN_LATIN};
use minerag_core::keywords::KeywordParams;
use minerag_core::memory::DEFAULT_MAX_ROUNDS;
use minerag_core::rerank::RerankParams;
use minerag_core::retrieve::RetrievalOptions;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub keywords: KeywordsConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_task_poll_interval_ms")]
    pub task_poll_interval_ms: u64,
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    #[serde(default = "default_pagination_max_total_hits")]
    pub pagination_max_total_hits: u64,
}

fn default_api_key_env() -> String {
    "MEILI_API_KEY".to_string()
}
fn default_index_prefix() -> String {
    "kb_".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_task_poll_interval_ms() -> u64 {
    100
}
fn default_task_timeout_secs() -> u64 {
    60
}
fn default_pagination_max_total_hits() -> u64 {
    100_000
}

impl IndexConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key_env: default_api_key_env(),
            index_prefix: default_index_prefix(),
            timeout_secs: default_timeout_secs(),
            task_poll_interval_ms: default_task_poll_interval_ms(),
            task_timeout_secs: default_task_timeout_secs(),
            pagination_max_total_hits: default_pagination_max_total_hits(),
        }
    }

    /// Index name backing knowledge base `kb`.
    pub fn index_name(&self, kb: &str) -> String {
        format!("{}{}", self.index_prefix, kb)
    }

    /// Bearer key from the configured environment variable, if set.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn task_poll_interval(&self) -> Duration {
        Duration::from_millis(self.task_poll_interval_ms)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_len_cjk")]
    pub max_len_cjk: usize,
    #[serde(default = "default_max_len_latin")]
    pub max_len_latin: usize,
    #[serde(default)]
    pub overlap: usize,
}

fn default_max_len_cjk() -> usize {
    DEFAULT_MAX_LEN_CJK
}
fn default_max_len_latin() -> usize {
    DEFAULT_MAX_LEN_LATIN
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_len_cjk: default_max_len_cjk(),
            max_len_latin: default_max_len_latin(),
            overlap: 0,
        }
    }
}

impl ChunkingConfig {
    pub fn options(&self) -> ChunkOptions {
        ChunkOptions {
            max_len_cjk: self.max_len_cjk,
            max_len_latin: self.max_len_latin,
            overlap: self.overlap,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SegmentationConfig {
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Worker executable. Defaults to this binary's `segment-worker`.
    #[serde(default)]
    pub worker_command: Option<PathBuf>,
    #[serde(default)]
    pub worker_args: Vec<String>,
    #[serde(default)]
    pub stop_words_path: Option<PathBuf>,
}

fn default_pool_size() -> usize {
    2
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            worker_command: None,
            worker_args: Vec::new(),
            stop_words_path: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
}

fn default_max_rounds() -> usize {
    DEFAULT_MAX_ROUNDS
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct KeywordsConfig {
    #[serde(default = "default_ratio")]
    pub ratio: f64,
    #[serde(default = "default_min_keywords")]
    pub min: usize,
    #[serde(default = "default_max_keywords")]
    pub max: usize,
}

fn default_ratio() -> f64 {
    0.6
}
fn default_min_keywords() -> usize {
    3
}
fn default_max_keywords() -> usize {
    20
}

impl Default for KeywordsConfig {
    fn default() -> Self {
        Self {
            ratio: default_ratio(),
            min: default_min_keywords(),
            max: default_max_keywords(),
        }
    }
}

impl KeywordsConfig {
    pub fn params(&self) -> KeywordParams {
        KeywordParams {
            ratio: self.ratio,
            min: self.min,
            max: self.max,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_primary")]
    pub primary: usize,
    #[serde(default = "default_min_extra_score")]
    pub min_extra_score: f64,
    #[serde(default = "default_max_score_gap")]
    pub max_score_gap: f64,
    #[serde(default = "default_highlight_pre_tag")]
    pub highlight_pre_tag: String,
    #[serde(default = "default_highlight_post_tag")]
    pub highlight_post_tag: String,
}

fn default_top_k() -> usize {
    100
}
fn default_primary() -> usize {
    5
}
fn default_min_extra_score() -> f64 {
    0.7
}
fn default_max_score_gap() -> f64 {
    0.6
}
fn default_highlight_pre_tag() -> String {
    "<mark>".to_string()
}
fn default_highlight_post_tag() -> String {
    "</mark>".to_string()
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            primary: default_primary(),
            min_extra_score: default_min_extra_score(),
            max_score_gap: default_max_score_gap(),
            highlight_pre_tag: default_highlight_pre_tag(),
            highlight_post_tag: default_highlight_post_tag(),
        }
    }
}

impl RetrievalConfig {
    pub fn rerank_params(&self) -> RerankParams {
        RerankParams {
            primary: self.primary,
            min_extra_score: self.min_extra_score,
            max_score_gap: self.max_score_gap,
        }
    }

    /// Retrieval options scoped to `allowed_ids` (empty = unrestricted).
    pub fn options(&self, allowed_ids: Vec<String>) -> RetrievalOptions {
        RetrievalOptions {
            top_k: self.top_k,
            allowed_ids,
            highlight_pre_tag: self.highlight_pre_tag.clone(),
            highlight_post_tag: self.highlight_post_tag.clone(),
        }
    }
}

impl Config {
    /// Defaults everywhere, pointed at `url`.
    pub fn minimal(url: impl Into<String>) -> Self {
        Self {
            index: IndexConfig::new(url),
            chunking: ChunkingConfig::default(),
            segmentation: SegmentationConfig::default(),
            memory: MemoryConfig::default(),
            keywords: KeywordsConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.index.url.trim().is_empty() {
            bail!("index.url must not be empty");
        }
        if self.index.timeout_secs == 0 {
            bail!("index.timeout_secs must be > 0");
        }
        if self.index.task_poll_interval_ms == 0 {
            bail!("index.task_poll_interval_ms must be > 0");
        }

        if self.chunking.max_len_cjk == 0 || self.chunking.max_len_latin == 0 {
            bail!("chunking.max_len_cjk and chunking.max_len_latin must be > 0");
        }

        if self.segmentation.pool_size == 0 {
            bail!("segmentation.pool_size must be > 0");
        }

        if self.memory.max_rounds == 0 {
            bail!("memory.max_rounds must be >= 1");
        }

        if self.keywords.ratio <= 0.0 {
            bail!("keywords.ratio must be > 0");
        }
        if self.keywords.min > self.keywords.max {
            bail!(
                "keywords.min ({}) must not exceed keywords.max ({})",
                self.keywords.min,
                self.keywords.max
            );
        }

        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be > 0");
        }
        if !(0.0..=1.0).contains(&self.retrieval.min_extra_score) {
            bail!("retrieval.min_extra_score must be in [0.0, 1.0]");
        }
        if self.retrieval.max_score_gap < 0.0 {
            bail!("retrieval.max_score_gap must be >= 0");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
