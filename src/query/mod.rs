//! Statement execution for db-steward.
//!
//! Classification, result materialization and escaping live here, alongside
//! the executor that ties them to a supervised connection.

pub mod classify;
pub mod escape;
pub mod executor;
pub mod materializer;

pub use classify::{classify_statement, ClassRule, Classification, StatementClass, CLASS_RULES};
pub use escape::{escape_all, escape_for_like_str, escape_str, escape_wildcards};
pub use executor::{Execution, QueryExecutor};
pub use materializer::{PendingResult, ResultMaterializer};
