//! # repo-chat
//!
//! A web service that loads a git repository into a chat session and answers
//! questions about its code with a language model.
//!
//! ## Architecture
//!
//! ```text
//!   POST /load-repo                          POST /chat
//!        │                                        │
//!        ▼                                        ▼
//!  ┌──────────────┐                       ┌───────────────┐
//!  │ validate URL │                       │ session lookup│
//!  │ shallow clone│                       └───────┬───────┘
//!  └──────┬───────┘                               │
//!         ▼                                       ▼
//!  ┌──────────────┐    ┌──────────────────────────────────┐
//!  │ file walk    │───▶│ ContextStore (one per deployment) │
//!  │ + classifier │    │  vector   : chunk, embed, top-K   │
//!  └──────────────┘    │  flat     : whole repo archive    │
//!                      │  metadata : summaries + selection │
//!                      └────────────────┬─────────────────┘
//!                                       ▼
//!                             ┌───────────────────┐
//!                             │ response generator│
//!                             │ system + history  │
//!                             │ + query → model   │
//!                             └───────────────────┘
//! ```
//!
//! Each load populates a new store generation and swaps the session snapshot
//! only once it is complete, so queries never see a half-built store.
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration and context-store selection
//! - [`error`] - Request-facing error taxonomy and its HTTP mapping
//! - [`models`] - File records, chunks, chat turns, request/response types
//! - [`git`] - URL validation, shallow clone, file classification and walking
//! - [`chunking`] - Line-based chunker with per-extension declaration markers
//! - [`llm`] - Embedding and chat-completion seams, response generation
//! - [`store`] - The vector, flat and metadata context stores
//! - [`session`] - Session registry with generations, idle expiry and LRU capacity
//! - [`ingest`] - Load and chat pipelines
//! - [`api`] - Axum HTTP handlers
//! - [`state`] - Shared application state

pub mod api;
pub mod chunking;
pub mod config;
pub mod error;
pub mod git;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod session;
pub mod state;
pub mod store;
