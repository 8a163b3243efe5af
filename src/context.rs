use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::BoxError;

/// Per-execution state threaded through every fetcher and batch function of one query.
///
/// The value is type-erased so that each application can store its own struct; fetchers and
/// loaders recover it with [`RequestContext::get`]. Cloning is cheap and shares the value.
#[derive(Clone)]
pub struct RequestContext {
    inner: Arc<dyn Any + Send + Sync>,
}

impl RequestContext {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self { inner: Arc::new(value) }
    }

    /// The context used when no [`ContextBuilder`] is registered.
    pub fn empty() -> Self {
        Self::new(())
    }

    /// Returns the custom context if it was built with type `T`.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is::<()>()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext").field("empty", &self.is_empty()).finish()
    }
}

/// What a single execution was asked to run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionInput {
    pub query: String,
    pub operation_name: Option<String>,
    pub variables: Map<String, Value>,
}

impl ExecutionInput {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), ..Default::default() }
    }

    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }
}

/// Builds the [`RequestContext`] for one execution.
///
/// Invoked exactly once per execution, before any field is resolved. An error aborts the
/// execution.
#[async_trait]
pub trait ContextBuilder: Send + Sync {
    async fn build(&self, input: &ExecutionInput) -> Result<RequestContext, BoxError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Greeting(&'static str);

    #[test]
    fn downcasts_to_the_stored_type_only() {
        let ctx = RequestContext::new(Greeting("hi"));
        assert_eq!(ctx.get::<Greeting>().map(|g| g.0), Some("hi"));
        assert!(ctx.get::<String>().is_none());
        assert!(!ctx.is_empty());
        assert!(RequestContext::default().is_empty());
    }
}
