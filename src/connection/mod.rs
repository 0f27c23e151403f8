//! Connection management for db-steward.
//!
//! A supervisor owns one logical connection; the registry hands out one
//! executor per distinct connection signature.

pub mod registry;
pub mod supervisor;

pub use registry::ConnectionRegistry;
pub use supervisor::ConnectionSupervisor;
