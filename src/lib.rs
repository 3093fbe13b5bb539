//! # Docparley: Conversational Document QA
//!
//! Docparley answers questions about uploaded documents. Each chat turn
//! retrieves the most relevant pieces of the referenced document and asks a
//! generative model to answer from those pieces only, with conversation
//! history folded into the question so follow-ups stay coherent.
//!
//! ## Pipeline
//!
//! ```text
//!                 POST /uploadFile                POST /chat
//!                       |                             |
//!                 [object store]              [answering engine]
//!                       |                             |
//!                       v                             v
//!   bytes --> extract --> chunk --> embed --> index --> retrieve --> generate
//!                                                         ^              |
//!                                   history -> condense --+              v
//!                                      ^                        [conversation store]
//!                                      +--------------------------------+
//! ```
//!
//! ## Quick Start
//!
//! The pieces compose without the HTTP layer. Splitting a document:
//!
//! ```
//! use docparley::chunker::Chunker;
//!
//! let chunker = Chunker::new(1000, 100)?;
//! let chunks = chunker.split("file:///tmp/contract.pdf", "Section 1.\nSection 2.");
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].ordinal, 0);
//! # Ok::<(), docparley::chunker::ChunkerError>(())
//! ```
//!
//! ## Module Guide
//!
//! - [`chunker`] - Boundary-aware text splitting with overlap
//! - [`index`] - Per-document embedding index, build and cache
//! - [`retriever`] - Top-k semantic retrieval over an index
//! - [`engine`] - The chat-turn state machine tying everything together
//! - [`backends`] - Embedding/generation backend traits and the OpenAI client
//! - [`stores`] - Session-scoped conversation persistence (SQLite)
//! - [`storage`] - Object storage for uploaded documents
//! - [`extract`] - PDF/DOCX text extraction
//! - [`service`] - Axum routes and HTTP error mapping
//! - [`config`] - Environment-driven settings
//! - [`errors`] - The request-level error taxonomy

pub mod backends;
pub mod chunker;
pub mod config;
pub mod engine;
pub mod errors;
pub mod extract;
pub mod index;
pub mod message;
pub mod retriever;
pub mod service;
pub mod storage;
pub mod stores;
pub mod telemetry;
