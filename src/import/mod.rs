//! Resumable import of SQL script files.

pub mod checkpoint;
pub mod importer;

pub use checkpoint::{Checkpoint, CHECKPOINT_SUFFIX, ERROR_LOG_SUFFIX};
pub use importer::{ImportReport, ImportState, ImportStatus, ResumableImporter, StatementExecutor};
