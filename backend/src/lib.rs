//! # TOU Backend
//!
//! Railcar downtime (turnaround) analytics engine.
//!
//! This crate ingests operational reports exported from the Cognos and SAP upstream
//! systems, reconciles them against the reference dictionaries, and computes target
//! downtime norms ("TOU") per user-defined calculation, projected forward across
//! several years with seasonal adjustment.
//!
//! ## Architecture
//!
//! The crate is organized into several logical modules:
//!
//! - [`api`]: Domain types shared by the pipeline, the repositories and the REST API
//! - [`config`]: TOML configuration (`tou.toml`) with environment overrides
//! - [`db`]: Repository pattern and persistence layer (in-memory and Postgres)
//! - [`ingest`]: Reference resolution and normalization of imported spreadsheets
//! - [`services`]: Coverage tracking, the TOU calculation engine and its lifecycle
//! - [`http`]: Axum-based HTTP server and request handlers
//!
//! ## Data flow
//!
//! ```text
//! spreadsheet ─► ingest (Read → Clean → Enrich → Derive → Shape) ─► fact store
//!                                                                    │
//!            coverage index ◄────────────────────────────────────────┤
//!                   │                                                │
//!   calculation controller (admission) ─► calculation engine ─► report artifact
//! ```

// Allow large error types - RepositoryError contains rich context for debugging
#![allow(clippy::result_large_err)]

#[macro_use]
mod macros;

pub mod api;
pub mod config;
pub mod db;
pub mod ingest;
pub mod services;

#[cfg(feature = "http-server")]
pub mod http;
