use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::error::BoxError;

/// What a batch function knows about the execution it is loading for.
#[derive(Debug, Clone)]
pub struct BatchLoaderEnvironment {
    pub loader_name: String,
    pub context: RequestContext,
}

/// A list-mode batch function.
///
/// Receives the keys collected during one execution frame in the order they were first
/// requested (repeated keys appear once unless the loader was registered without deduplication)
/// and must return exactly one value per key at the same position.
/// Returning a different number of values is a fatal error for the execution.
#[async_trait]
pub trait BatchLoader<K, V>: Send + Sync {
    async fn load(&self, keys: &[K], env: &BatchLoaderEnvironment) -> Result<Vec<V>, BoxError>;
}

/// A mapped-mode batch function.
///
/// Unlike [`BatchLoader`] it may return any subset of the requested keys, in any order.
/// Requesters of keys absent from the map receive a [`LoadError::MissingKey`] while the other
/// keys of the batch resolve normally.
///
/// [`LoadError::MissingKey`]: crate::LoadError::MissingKey
#[async_trait]
pub trait MappedBatchLoader<K, V>: Send + Sync {
    async fn load(
        &self,
        keys: &[K],
        env: &BatchLoaderEnvironment,
    ) -> Result<HashMap<K, V>, BoxError>;
}

/// A batch function in one of the two supported result conventions.
pub enum BatchLoaderFn<K, V> {
    List(Arc<dyn BatchLoader<K, V>>),
    Mapped(Arc<dyn MappedBatchLoader<K, V>>),
}

impl<K, V> BatchLoaderFn<K, V> {
    pub fn list<L: BatchLoader<K, V> + 'static>(loader: L) -> Self {
        BatchLoaderFn::List(Arc::new(loader))
    }

    pub fn mapped<L: MappedBatchLoader<K, V> + 'static>(loader: L) -> Self {
        BatchLoaderFn::Mapped(Arc::new(loader))
    }

    pub fn mode(&self) -> &'static str {
        match self {
            BatchLoaderFn::List(_) => "list",
            BatchLoaderFn::Mapped(_) => "mapped",
        }
    }
}

impl<K, V> Clone for BatchLoaderFn<K, V> {
    fn clone(&self) -> Self {
        match self {
            BatchLoaderFn::List(f) => BatchLoaderFn::List(Arc::clone(f)),
            BatchLoaderFn::Mapped(f) => BatchLoaderFn::Mapped(Arc::clone(f)),
        }
    }
}
