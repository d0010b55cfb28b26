//! # translate-pipeline
//!
//! Multi-tenant HTML translation job pipeline: fetch or accept HTML, segment
//! it into translatable units, dedupe against a per-site translation memory,
//! queue whatever is left as a lease-based job, and drive it to completion
//! through a pool of workers polling a Postgres-backed queue.
//!
//! ## Modules
//!
//! - [`hasher`]: segment normalization and content hashing (C1)
//! - [`segmenter`]: HTML -> translatable segment extraction (C2)
//! - [`db::memory`]: per-site translation memory (C3)
//! - [`db::jobs`]: job and work-unit persistence (C4)
//! - [`db::queue`]: `FOR UPDATE SKIP LOCKED` lease queue (C5)
//! - [`intake`]: intake coordination tying C1-C5 together (C6)
//! - [`worker`]: the worker loop that claims and drains jobs (C7)
//! - [`status`]: job status/progress assembly (C8)
//! - [`api`]: the HTTP API surface (C9)
//! - [`config`]: environment-driven configuration (C10)
//! - [`db::pool`]: the Postgres connection pool (C11)
//! - [`ratelimit`]: per-site token-bucket rate limiting (C12)
//! - [`provider`]: the external translation provider client
//! - [`fetch`]: bounded HTTP fetch of source HTML
//! - [`crypto`]: AES-256-GCM helper for the optional `TOKEN_ENC_KEY` secret
//! - [`error`]: the closed error taxonomy shared across every module

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod fetch;
pub mod hasher;
pub mod intake;
pub mod provider;
pub mod ratelimit;
pub mod segmenter;
pub mod status;
pub mod worker;

/// Crate version, as reported by the health endpoint.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
