//! Query execution
//!
//! - `QueryExecutor` - runs a query in a container, retrying until the server is ready
//! - `QueryRunner` - the interface request handlers call into

pub mod query;
pub mod r#trait;

pub use query::{is_ready, query_command, ExecOutput, QueryExecutor, READINESS_SENTINEL};
pub use r#trait::QueryRunner;
