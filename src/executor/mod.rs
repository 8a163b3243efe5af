//! GraphQL query executor
//!
//! Executes queries against the loaded schema, driving field resolution through a per-execution
//! [`BatchScheduler`](crate::BatchScheduler) so that loads issued by sibling resolvers are
//! batched.
//!
//! The executor is split into several sub-modules:
//! - `core`: the [`QueryExecutor`] façade and its builder
//! - `field_resolver`: field resolution and value completion
//! - `result`: response types
//! - `json_path`: JSON-path extraction from serialized results
//! - `utils`: value and argument conversion

mod core;
mod field_resolver;
pub mod json_path;
mod result;
pub(crate) mod utils;

pub use self::core::{QueryExecutor, QueryExecutorBuilder};
pub use result::{ErrorClassification, ExecutionResult, GraphQLError, PathSegment};
