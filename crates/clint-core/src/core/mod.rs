//! Implementation modules for `clint-core`.
//!
//! The CLI goes through `clint_core::api`; tests inside the crate reach in
//! here directly.

pub mod bagit;
pub mod catalog;
pub mod config;
pub mod lifecycle;
pub mod replication;
pub mod runtime;
pub mod tooling;
