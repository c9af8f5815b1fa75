//! # Deskmate
//!
//! A retrieval-augmented answering engine for team chat.
//!
//! Deskmate ingests normalized chat events with at-least-once dedup,
//! indexes documents and conversation threads into a vector index, and
//! answers questions grounded in the indexed material, with per-thread
//! conversation memory and a confidence label on every answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌─────────────┐
//! │  Events  │──▶│  Ingest   │──▶│   SQLite    │
//! │ (chat)   │   │  (dedup)  │   │ msgs + docs │
//! └──────────┘   └───────────┘   └──────┬──────┘
//!                                       │
//! ┌──────────┐   ┌───────────┐   ┌──────▼──────┐
//! │   Docs   │──▶│  Indexer  │──▶│   Vector    │
//! │ Threads  │   │Chunk+Embed│   │   index     │
//! └──────────┘   └───────────┘   └──────┬──────┘
//!                                       │
//!                   ┌───────────┐   ┌───▼──────┐
//!                   │  Memory   │──▶│  Answer  │──▶ answer + sources
//!                   │ (threads) │   │  engine  │      + confidence
//!                   └───────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! deskmate init                          # create database
//! deskmate add-doc --title "Runbook" runbook.md
//! deskmate ask "how do I reset a password?"
//! deskmate serve api                     # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`ingest`] | Event intake and dedup |
//! | [`chunk`] | Text chunking and record ids |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`llm`] | Text generation abstraction |
//! | [`index`] | Vector index abstraction and backends |
//! | [`indexer`] | Document and thread indexing jobs |
//! | [`memory`] | Per-conversation memory |
//! | [`engine`] | Retrieval-augmented answering |
//! | [`store`] | Relational storage |
//! | [`server`] | JSON HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod app;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod index;
pub mod indexer;
pub mod ingest;
pub mod llm;
pub mod memory;
pub mod migrate;
pub mod models;
pub mod server;
pub mod store;
