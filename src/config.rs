//! Executor configuration
//!
//! Replaces container-driven wiring with plain structs: an [`ExecutorConfig`] is loaded from YAML
//! (or built in code) and handed to [`QueryExecutor::builder`], which takes the code-level
//! registrations (fetchers, loaders, context builder).
//!
//! ```yaml
//! schema-locations:
//!   - schema
//!   - extra/schema
//! data-loaders:
//!   max-batch-size: 100
//! ```
//!
//! [`QueryExecutor::builder`]: crate::QueryExecutor::builder

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ExecutorError;

/// Behaviour of one registered batch loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LoaderOptions {
    /// Merge requests for the same key within one batch window.
    pub dedup: bool,
    /// Keep loaded values for the rest of the execution.
    pub caching: bool,
    /// Split windows larger than this into several batch calls.
    pub max_batch_size: Option<usize>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self { dedup: true, caching: true, max_batch_size: None }
    }
}

impl LoaderOptions {
    pub fn without_dedup(mut self) -> Self {
        self.dedup = false;
        self
    }

    pub fn without_caching(mut self) -> Self {
        self.caching = false;
        self
    }

    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = Some(size);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ExecutorConfig {
    /// Directories scanned recursively for `*.graphql` and `*.graphqls` files.
    pub schema_locations: Vec<PathBuf>,
    /// Options applied to loaders registered without explicit options.
    pub data_loaders: LoaderOptions,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { schema_locations: vec![PathBuf::from("schema")], data_loaders: LoaderOptions::default() }
    }
}

impl ExecutorConfig {
    /// A configuration that only uses inline schema definitions.
    pub fn without_schema_locations() -> Self {
        Self { schema_locations: Vec::new(), ..Default::default() }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ExecutorError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ExecutorError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|source| ExecutorError::ConfigRead { path: path.to_owned(), source })?;
        Self::from_yaml_str(&content)
    }
}
