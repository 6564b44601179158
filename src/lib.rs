//! # kb-answer
//!
//! Hybrid retrieval and contradiction-aware answering over an internal
//! knowledge base.
//!
//! Each document is represented by one metadata record (description,
//! canonical tags, lifecycle fields, description embedding). A question is
//! scored against every record with a weighted mix of embedding similarity,
//! tag overlap and BM25; the top documents are loaded in full and handed to
//! a chat model under a strict grounding instruction that forces citations,
//! surfaces contradictions between old and new documents, and abstains when
//! the answer is not in the sources.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────────┐   ┌──────────────┐
//! │ metadata.csv │──▶│   kb-answer-core     │◀──│ embeddings / │
//! │ master_tags  │   │ retrieve→rerank→     │   │ chat (HTTP)  │
//! └──────────────┘   │ compose              │   └──────────────┘
//!                    └──────────┬───────────┘
//!                  ┌────────────┼────────────┐
//!                  ▼            ▼            ▼
//!             ┌────────┐  ┌──────────┐  ┌──────────┐
//!             │  CLI   │  │   HTTP   │  │ kb_root  │
//!             │ (kba)  │  │  server  │  │  bodies  │
//!             └────────┘  └──────────┘  └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kba index                                  # validate the metadata store
//! kba retrieve "senior engineer PTO"         # sub-score table, no answer
//! kba ask "How many PTO days do senior engineers get?"
//! kba serve                                  # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`metadata`] | CSV + tag map loader |
//! | [`docstore`] | Filesystem document bodies |
//! | [`embedding`] | OpenAI-compatible embedding provider |
//! | [`completion`] | OpenAI-compatible chat provider |
//! | [`engine`] | Wiring config into the core engine |
//! | [`server`] | HTTP server |
//! | [`search`] | `kba ask` / `kba retrieve` |
//! | [`get`] | `kba get` |
//! | [`stats`] | `kba index` |

pub mod client;
pub mod completion;
pub mod config;
pub mod docstore;
pub mod embedding;
pub mod engine;
pub mod get;
pub mod metadata;
pub mod search;
pub mod server;
pub mod stats;
