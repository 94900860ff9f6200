//! # Folio
//!
//! Retrieval-grounded chat over a personal data corpus.
//!
//! Folio loads a nested JSON corpus describing a person (profile, contact,
//! academics, work history, projects), flattens it into typed text chunks,
//! embeds them once per process, and answers chat questions grounded in the
//! best-matching chunks, streaming the generated answer back token by token.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌─────────┐   ┌───────────────┐
//! │ Corpus  │──▶│ Chunks  │──▶│ Knowledge Base │
//! │ (JSON)  │   │ (typed) │   │ (embedded,     │
//! └─────────┘   └─────────┘   │  built once)   │
//!                             └──────┬────────┘
//!                                    │ per request
//!                                    ▼
//!                  embed query → rank top-k → assemble prompt
//!                                    │
//!                                    ▼
//!                         streamed generation (HTTP)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export OPENAI_API_KEY=sk-...
//! folio chunks                  # preview the chunks built from the corpus
//! folio ask "What does Alice do?"
//! folio serve                   # start the chat server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`corpus`] | Corpus data model and loading |
//! | [`chunks`] | Deterministic corpus-to-chunk flattening |
//! | [`embedding`] | Embedding provider abstraction and cosine similarity |
//! | [`knowledge`] | Build-once knowledge base cache |
//! | [`rank`] | Top-k similarity ranking |
//! | [`generation`] | Streaming generation provider |
//! | [`pipeline`] | Per-request query pipeline |
//! | [`server`] | HTTP chat server |

pub mod chunks;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod generation;
pub mod knowledge;
pub mod pipeline;
pub mod rank;
pub mod server;
