//! db-steward - supervised MySQL connections and resumable SQL imports.
//!
//! This library exposes the core modules for use by the `steward` binary
//! and integration tests.

pub mod accel;
pub mod config;
pub mod connection;
pub mod db;
pub mod error;
pub mod import;
pub mod logging;
pub mod query;
