//! Core types and trait definitions for the Satchel document store.
//!
//! This crate is deliberately free of storage and crypto dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod backend;
pub mod document;
pub mod error;
pub mod provider;
pub mod schema;

pub use error::{Error, Issue, IssueList, Result};
