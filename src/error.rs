//! Error types for loading and query execution.
//!
//! Errors fall in two groups. [`LoadError`] is produced per key by a loader and stays local to the
//! field whose resolver awaited it. [`ExecutorError`] covers everything that prevents an executor
//! from being built or an execution from completing.

use std::path::PathBuf;

use thiserror::Error;

use crate::executor::GraphQLError;

/// Error type returned by user supplied fetchers, batch functions and context builders.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a single pending load did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// A mapped batch function returned no entry for this key.
    #[error("loader '{loader}' returned no value for key {key}")]
    MissingKey { loader: String, key: String },

    /// A list batch function returned a different number of values than keys it was given.
    #[error("loader '{loader}' returned {actual} values for {expected} keys")]
    BatchShape { loader: String, expected: usize, actual: usize },

    /// The batch function itself returned an error.
    #[error("loader '{loader}' failed: {message}")]
    BatchFailed { loader: String, message: String },

    /// The execution owning the loader was aborted before the load was dispatched.
    #[error("load from '{loader}' was cancelled")]
    Cancelled { loader: String },

    /// No loader with this name is registered.
    #[error("no data loader named '{loader}' is registered")]
    NotRegistered { loader: String },

    /// The loader exists but with different key or value types.
    #[error("data loader '{loader}' was requested with the wrong key or value type")]
    TypeMismatch { loader: String },
}

/// Failure to pull a typed value out of a serialized result tree.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("path '{path}' does not resolve in the result")]
    PathNotFound { path: String },

    #[error("'{path}' is not a valid JSONPath expression: {message}")]
    InvalidPath { path: String, message: String },

    #[error("value at '{path}' cannot be read as the requested type: {source}")]
    TypeMismatch {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    /// No schema file or inline schema definition was found at build time.
    #[error("no schema files found in {locations:?} and no inline schema was provided")]
    SchemaNotFound { locations: Vec<PathBuf> },

    #[error("failed to read schema file {path:?}: {source}")]
    SchemaRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid schema in {origin}: {message}")]
    SchemaParse { origin: String, message: String },

    #[error("invalid executor configuration: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("failed to read configuration file {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The registered context builder failed; no field was resolved.
    #[error("context builder failed: {0}")]
    ContextBuild(#[source] BoxError),

    /// A list batch function broke the one-value-per-key contract.
    #[error("loader '{loader}' returned {actual} values for {expected} keys")]
    BatchShape { loader: String, expected: usize, actual: usize },

    /// The query executed but its result carries errors.
    #[error("query failed with {} error(s): {}", errors.len(), join_messages(errors))]
    QueryFailed { errors: Vec<GraphQLError> },

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

fn join_messages(errors: &[GraphQLError]) -> String {
    errors.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join("; ")
}
