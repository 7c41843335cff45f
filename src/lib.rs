//! # askpage
//!
//! Ask questions about any web page, answered from the page itself.
//!
//! askpage fetches a URL, strips the markup down to readable text, chunks
//! and embeds that text with a local model, and retrieves the chunks
//! closest to the question as context for an LLM answer. Each page is
//! indexed once and the index is persisted, so repeat questions about the
//! same URL skip straight to retrieval.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌─────────────┐
//! │  Fetch   │──▶│ Chunk + Embed │──▶│  Per-URL    │
//! │  (HTML)  │   │   (local)     │   │ flat index  │
//! └──────────┘   └───────────────┘   └─────┬───────┘
//!                                          │
//!                  question ──▶ plan ──▶ search ──▶ answer
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! askpage serve                                  # start the HTTP service
//! askpage ask --url https://example.com "what is this page about?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`identity`] | Persistent URL-to-id mapping |
//! | [`fetch`] | Page download and markup stripping |
//! | [`chunk`] | Sliding-window text chunking |
//! | [`embedding`] | Local embedding model |
//! | [`index`] | Flat exact-NN vector index |
//! | [`planner`] | Search text planning |
//! | [`answer`] | Context-grounded answer synthesis |
//! | [`llm`] | Groq chat completion client |
//! | [`pipeline`] | End-to-end orchestration |
//! | [`server`] | axum HTTP boundary |
//! | [`error`] | Pipeline error taxonomy |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod fetch;
pub mod identity;
pub mod index;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod planner;
pub mod server;
