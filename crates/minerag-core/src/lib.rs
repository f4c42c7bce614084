//! # minerag Core
//!
//! Runtime-agnostic logic for minerag: the fragment data model, the
//! boundary-preserving chunker, bounded conversational memory, keyword
//! extraction, the tiered retrieval state machine, score-window reranking,
//! and prompt assembly.
//!
//! This crate contains no tokio, reqwest, process spawning, or filesystem
//! I/O. Segmentation and the external document index are reached through
//! the [`keywords::Tokenizer`] and [`index::DocumentIndex`] traits, which
//! the `minerag` app crate implements.

pub mod chunk;
pub mod index;
pub mod keywords;
pub mod memory;
pub mod models;
pub mod prompt;
pub mod rerank;
pub mod retrieve;
pub mod text;
