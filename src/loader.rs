use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{mpsc, Notify};

use crate::{
    batch_function::{BatchLoaderEnvironment, BatchLoaderFn},
    cache::Cache,
    config::LoaderOptions,
    error::LoadError,
    loader_op::{LoadRequest, LoaderOp},
    loader_worker::LoaderWorker,
};

/// Batch loads values from some expensive resource, primarily intended for mitigating GraphQL's
/// N+1 problem.
///
/// Resolvers call [`Loader::load`] and [`Loader::load_many`] to fetch values from the underlying
/// resource or cache. The cache can be cleared with calls to [`Loader::clear`],
/// [`Loader::clear_many`] and [`Loader::clear_all`], and values can be added to the cache
/// out-of-band through the use of [`Loader::prime`] and [`Loader::prime_many`].
///
/// The `Loader` is a cheap, cloneable handle. It enqueues the requested operations for its
/// [`LoaderWorker`], which belongs to the [`BatchScheduler`] of the same execution. Load calls
/// suspend until the scheduler has flushed the batch window that contains their key.
///
/// [`BatchScheduler`]: crate::BatchScheduler
pub struct Loader<K, V> {
    name: Arc<str>,
    request_tx: mpsc::UnboundedSender<LoaderOp<K, V>>,
    wake: Arc<Notify>,
}

impl<K, V> Clone for Loader<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            request_tx: self.request_tx.clone(),
            wake: Arc::clone(&self.wake),
        }
    }
}

impl<K, V> Debug for Loader<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader").field("name", &self.name).finish()
    }
}

impl<K, V> Loader<K, V>
where
    K: 'static + Eq + Hash + Debug + Clone + Send + Sync,
    V: 'static + Send + Sync + Debug + Clone,
{
    /// Creates a loader handle and the worker that serves it.
    ///
    /// `wake` is notified whenever a request is enqueued, so that a scheduler idling on external
    /// work knows there is something to flush.
    pub(crate) fn new<CacheT>(
        batch_fn: BatchLoaderFn<K, V>,
        options: LoaderOptions,
        cache: CacheT,
        env: BatchLoaderEnvironment,
        wake: Arc<Notify>,
    ) -> (Self, LoaderWorker<K, V, CacheT>)
    where
        CacheT: 'static + Cache<K = K, V = V> + Send,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let loader = Self { name: Arc::from(env.loader_name.as_str()), request_tx: tx, wake };
        let worker = LoaderWorker::new(batch_fn, options, cache, rx, env);
        (loader, worker)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Loads a value from the underlying resource.
    ///
    /// If the value is already in the loader cache, it is returned as soon as the request is
    /// processed. Otherwise, the requested key is staged for batch loading in the next loader
    /// execution frame.
    pub async fn load(&self, key: K) -> Result<V, LoadError> {
        let (request, response_rx) = LoadRequest::new(key);
        self.send(LoaderOp::Load(request));
        response_rx.await.unwrap_or_else(|_| Err(self.cancelled()))
    }

    /// Loads many values at once.
    ///
    /// Every key is registered in the same execution frame, so they all share one batch. Each
    /// key resolves independently; a missing key does not fail the others.
    pub async fn load_many(&self, keys: Vec<K>) -> Vec<Result<V, LoadError>> {
        join_all(keys.into_iter().map(|key| self.load(key))).await
    }

    /// Adds a value to the cache.
    pub fn prime(&self, key: K, value: V) {
        self.send(LoaderOp::Prime(key, value));
    }

    /// Adds many values to the cache at once.
    pub fn prime_many(&self, key_vals: Vec<(K, V)>) {
        self.send(LoaderOp::PrimeMany(key_vals));
    }

    /// Removes a value from the cache.
    ///
    /// This key will be reloaded when it is next requested.
    pub fn clear(&self, key: K) {
        self.send(LoaderOp::Clear(key));
    }

    /// Removes multiple values from the cache at once.
    ///
    /// These keys will be reloaded when requested.
    pub fn clear_many(&self, keys: Vec<K>) {
        self.send(LoaderOp::ClearMany(keys));
    }

    pub fn clear_all(&self) {
        self.send(LoaderOp::ClearAll);
    }

    fn send(&self, op: LoaderOp<K, V>) {
        match self.request_tx.send(op) {
            Ok(()) => self.wake.notify_one(),
            // The worker is gone; a load request resolves as cancelled when its sender drops.
            Err(e) => tracing::debug!(loader = %self.name, op = ?e.0, "loader worker dropped"),
        }
    }

    fn cancelled(&self) -> LoadError {
        LoadError::Cancelled { loader: self.name.to_string() }
    }
}
