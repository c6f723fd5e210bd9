//! # Repo Memory
//!
//! A repository ingestion and semantic-memory engine.
//!
//! Repo Memory turns a source-code repository into a persistent, queryable
//! memory: a structural summary, a set of heuristically detected
//! architectural and style patterns, and a bank of embedded code chunks
//! usable for similarity retrieval. Downstream analysis tools read that
//! memory through the context builder and the novelty detector.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────┐
//! │ SourceTree  │──▶│   Ingestor    │──▶│  SQLite    │
//! │ (checkout)  │   │ Scan+Embed   │   │ memory+vec │
//! └─────────────┘   └──────────────┘   └─────┬─────┘
//!                                            │
//!                        ┌───────────────────┤
//!                        ▼                   ▼
//!                  ┌───────────┐      ┌───────────┐
//!                  │  Context  │      │  Novelty  │
//!                  │  Builder  │      │  Detector │
//!                  └───────────┘      └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! repomem init                              # create database
//! repomem ingest owner/repo ./checkout      # full scan + embed
//! repomem context owner/repo --query "auth" # ranked retrieval
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`sources`] | Source tree abstraction and filesystem implementation |
//! | [`scanner`] | Tree classification, frameworks, key files |
//! | [`chunker`] | Language-aware text chunking |
//! | [`languages`] | Per-language boundary and import tables |
//! | [`patterns`] | Heuristic pattern detection |
//! | [`pipeline`] | Batched chunk-and-embed pipeline |
//! | [`ingest`] | Ingestion orchestrator |
//! | [`embedder`] | Embedding provider abstraction |
//! | [`context`] | Ranked context retrieval |
//! | [`novelty`] | Duplicate-suggestion suppression |
//! | [`store`] | Storage traits, in-memory and SQLite backends |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod cache;
pub mod chunker;
pub mod config;
pub mod context;
pub mod db;
pub mod embedder;
pub mod error;
pub mod filters;
pub mod ingest;
pub mod languages;
pub mod migrate;
pub mod models;
pub mod novelty;
pub mod patterns;
pub mod pipeline;
pub mod progress;
pub mod scanner;
pub mod sources;
pub mod store;
