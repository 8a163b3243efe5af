use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::context::RequestContext;
use crate::error::{BoxError, LoadError};
use crate::loader::Loader;
use crate::registry::DataLoaderRegistry;

/// Everything a fetcher can see while resolving one field.
pub struct DataFetchingEnvironment<'a> {
    pub(crate) parent_type: &'a str,
    pub(crate) field_name: &'a str,
    pub(crate) source: &'a Value,
    pub(crate) arguments: Map<String, Value>,
    pub(crate) context: &'a RequestContext,
    pub(crate) loaders: &'a DataLoaderRegistry,
}

impl<'a> DataFetchingEnvironment<'a> {
    pub fn parent_type(&self) -> &str {
        self.parent_type
    }

    pub fn field_name(&self) -> &str {
        self.field_name
    }

    /// The value the parent field resolved to; `null` for root fields.
    pub fn source(&self) -> &Value {
        self.source
    }

    /// Coerced arguments of the field, with variables substituted and schema defaults applied.
    pub fn arguments(&self) -> &Map<String, Value> {
        &self.arguments
    }

    /// Reads one argument as `T`. Absent or `null` arguments give `Ok(None)`.
    pub fn argument<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, serde_json::Error> {
        match self.arguments.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some),
        }
    }

    pub fn context(&self) -> &RequestContext {
        self.context
    }

    /// Shortcut for `context().get::<T>()`.
    pub fn custom_context<T: 'static>(&self) -> Option<&T> {
        self.context.get::<T>()
    }

    /// The loader named `name` for this execution.
    pub fn data_loader<K: 'static, V: 'static>(&self, name: &str) -> Result<&Loader<K, V>, LoadError> {
        self.loaders.get::<K, V>(name)
    }
}

/// Resolves the value of one `(type, field)` pair.
///
/// The returned JSON is completed against the field's schema type: objects are resolved further
/// through the query's selection set, lists element by element.
#[async_trait]
pub trait DataFetcher: Send + Sync {
    async fn fetch(&self, env: &DataFetchingEnvironment<'_>) -> Result<Value, BoxError>;
}

/// A fetcher that always returns the same value.
#[derive(Debug, Clone)]
pub struct StaticFetcher(pub Value);

#[async_trait]
impl DataFetcher for StaticFetcher {
    async fn fetch(&self, _env: &DataFetchingEnvironment<'_>) -> Result<Value, BoxError> {
        Ok(self.0.clone())
    }
}

/// Registered fetchers keyed by parent type and field name.
#[derive(Default, Clone)]
pub struct FetcherRegistry {
    fetchers: HashMap<(String, String), Arc<dyn DataFetcher>>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F: DataFetcher + 'static>(
        &mut self,
        parent_type: impl Into<String>,
        field_name: impl Into<String>,
        fetcher: F,
    ) {
        let key = (parent_type.into(), field_name.into());
        tracing::debug!(parent_type = %key.0, field = %key.1, "registering data fetcher");
        self.fetchers.insert(key, Arc::new(fetcher));
    }

    pub fn get(&self, parent_type: &str, field_name: &str) -> Option<&Arc<dyn DataFetcher>> {
        self.fetchers.get(&(parent_type.to_owned(), field_name.to_owned()))
    }

    pub fn coordinates(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fetchers.keys().map(|(t, f)| (t.as_str(), f.as_str()))
    }
}
