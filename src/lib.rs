//! # litharvest
//!
//! A scholarly-document collection pipeline: discover papers at a remote
//! source, download and verify them, render PDFs to markdown through an
//! external service, filter boilerplate sections, chunk under a token
//! budget, embed, and index for semantic retrieval — with full traceability
//! from every search hit back to its document, section, and position.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌────────┐   ┌────────┐   ┌─────────┐
//! │ Discover │──▶│ Acquire │──▶│ Render │──▶│ Filter │──▶│  Chunk  │
//! └──────────┘   └─────────┘   └────────┘   └────────┘   └────┬────┘
//!                                                             │
//!                               ┌──────────────┐   ┌──────────▼───────┐
//!                               │ Vector index │◀──│  Content store   │
//!                               │ (IDs only)   │   │ (text of record) │
//!                               └──────┬───────┘   └──────────▲───────┘
//!                                      │        decode        │
//!                                      └────────────────────────
//! ```
//!
//! ## Quick start
//!
//! ```bash
//! lith init                          # create database and output layout
//! lith collect --query "cat:cs.CL"   # discover, process, and index papers
//! lith search "attention mechanisms" # semantic search with provenance
//! lith status                        # what's indexed
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`source`] | Atom-feed discovery of candidate papers |
//! | [`acquire`] | Verified download with retry and dual hashing |
//! | [`render`] | PDF-to-markdown service client |
//! | [`filter`] | Structural section exclusion |
//! | [`chunker`] | Token-budgeted chunking with atomic blocks |
//! | [`encoder`] | Embedding providers |
//! | [`store`] | Transactional content store |
//! | [`index`] | Vector index over opaque chunk IDs |
//! | [`decoder`] | Chunk ID to text resolution |
//! | [`pipeline`] | Orchestration, concurrency, deadlines |
//! | [`catalog`] | Persisted collection catalog |
//! | [`proclog`] | JSONL processing log |

pub mod acquire;
pub mod cache;
pub mod catalog;
pub mod chunker;
pub mod config;
pub mod db;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod filter;
pub mod index;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod proclog;
pub mod render;
pub mod retry;
pub mod search;
pub mod source;
pub mod stats;
pub mod store;
