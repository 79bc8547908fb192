//! # avotrace
//!
//! Server, CLI and sync client around [`avotrace_core`].
//!
//! - [`api`]: axum router, handlers and JSON types
//! - [`cli`]: clap commands over a local database
//! - [`config`]: `avotrace.toml` and environment overrides
//! - [`remote`]: HTTP client for the shared tier

pub mod api;
pub mod cli;
pub mod config;
pub mod remote;
