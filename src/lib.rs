//! # minerag
//!
//! Retrieval-augmented prompt assembly over an external full-text index.
//!
//! Text extracted from source documents is chunked, segmented into
//! space-separated tokens, and written to one index per knowledge base.
//! At query time keywords are extracted with the help of per-session
//! conversational memory, a tiered backoff search runs against the index,
//! hits are reranked by score window, and the survivors are rendered into
//! an LLM-ready prompt.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌────────────┐   ┌──────────────┐
//! │  Text    │──▶│  Chunker    │──▶│ Segmenter  │──▶│ Index service │
//! │ (files)  │   │ (core)      │   │ (workers)  │   │ (HTTP)        │
//! └──────────┘   └─────────────┘   └────────────┘   └──────┬───────┘
//!                                                          │
//!           ┌──────────────────────────────────────────────┘
//!           ▼
//!   ┌───────────────┐   ┌──────────┐   ┌──────────┐
//!   │ Tiered search │──▶│ Reranker │──▶│  Prompt  │
//!   │ + memory      │   │          │   │          │
//!   └───────────────┘   └──────────┘   └──────────┘
//! ```
//!
//! The pure pieces (chunking, memory, keywords, tiers, reranking,
//! prompts) live in `minerag-core`; this crate adds the runtime.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`segment_pool`] | Persistent segmentation worker processes |
//! | [`segment_worker`] | The worker side of the segmentation protocol |
//! | [`segmenter`] | Punctuation stripping, Latin bypass, stop words |
//! | [`index_client`] | HTTP client for the index service |
//! | [`lifecycle`] | Knowledge-base index creation, settings, deletion |
//! | [`scan`] | Source file discovery |
//! | [`ingest`] | Ingestion pipeline |
//! | [`fragments`] | Fragment listing and source deletion |
//! | [`sessions`] | Per-conversation memory registry |
//! | [`query`] | Query answering with outer retry |

pub mod config;
pub mod fragments;
pub mod index_client;
pub mod ingest;
pub mod lifecycle;
pub mod query;
pub mod scan;
pub mod segment_pool;
pub mod segment_worker;
pub mod segmenter;
pub mod sessions;
