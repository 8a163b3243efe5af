use std::fmt::Debug;
use std::hash::Hash;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::mpsc;

use crate::{
    batch_function::{BatchLoaderEnvironment, BatchLoaderFn},
    cache::Cache,
    config::LoaderOptions,
    error::{ExecutorError, LoadError},
    key_registry::{KeyRegistry, PendingEntry},
    loader_op::LoaderOp,
    scheduler::PendingBatch,
};

#[cfg(feature = "stats")]
use crate::worker_stats::WorkerStats;

/// A `LoaderWorker` owns the loading state of one loader for one execution.
///
/// It is not a task of its own: the [`BatchScheduler`] drives it, which is what lets the
/// scheduler put a barrier between "resolvers request keys" and "keys are loaded".
///
/// Each cycle through the scheduler loop is an "execution frame" with two steps:
///
/// 1. Collect. Once every resolver of the current pass is suspended, the worker drains its
///    request queue without waiting. Prime and Clear requests are applied to the cache right
///    away. Load requests are answered from the cache when possible (never, for loaders with
///    caching turned off), otherwise they are staged in
///    the [`KeyRegistry`], which forms the batch window.
///
/// 2. Execute. The window is closed and its keys are handed to the batch function, once (or once
///    per chunk when a maximum batch size is configured). Every staged request receives its value
///    or an error; successfully loaded values go into the cache. Requests sent while the batch
///    function runs stay queued and form the next window.
///
/// [`BatchScheduler`]: crate::scheduler::BatchScheduler
pub struct LoaderWorker<K, V, CacheT>
where
    K: 'static + Eq + Hash + Debug + Clone + Send + Sync,
    V: 'static + Send + Sync + Debug + Clone,
    CacheT: 'static + Cache<K = K, V = V> + Send,
{
    name: String,
    batch_fn: BatchLoaderFn<K, V>,
    options: LoaderOptions,
    cache: CacheT,
    request_rx: mpsc::UnboundedReceiver<LoaderOp<K, V>>,
    registry: KeyRegistry<K, V>,
    env: BatchLoaderEnvironment,
    #[cfg(feature = "stats")]
    stats: WorkerStats,
}

/// What one batch call produced.
struct ChunkOutcome<K, V> {
    loaded: Vec<(K, V)>,
    shape_error: Option<(usize, usize)>,
}

impl<K, V> Default for ChunkOutcome<K, V> {
    fn default() -> Self {
        Self { loaded: Vec::new(), shape_error: None }
    }
}

impl<K, V, CacheT> LoaderWorker<K, V, CacheT>
where
    K: 'static + Eq + Hash + Debug + Clone + Send + Sync,
    V: 'static + Send + Sync + Debug + Clone,
    CacheT: 'static + Cache<K = K, V = V> + Send,
{
    pub fn new(
        batch_fn: BatchLoaderFn<K, V>,
        options: LoaderOptions,
        cache: CacheT,
        request_rx: mpsc::UnboundedReceiver<LoaderOp<K, V>>,
        env: BatchLoaderEnvironment,
    ) -> Self {
        Self {
            name: env.loader_name.clone(),
            batch_fn,
            options,
            cache,
            request_rx,
            registry: KeyRegistry::new(options.dedup),
            #[cfg(feature = "stats")]
            stats: WorkerStats::new(&env.loader_name),
            env,
        }
    }

    fn mux_op(&mut self, op: LoaderOp<K, V>) {
        match op {
            LoaderOp::Load(request) => {
                #[cfg(feature = "stats")]
                self.stats.record_load_request();
                if let Some(value) = self.cache.lookup(&request.key) {
                    tracing::trace!(loader = %self.name, key = ?request.key, "cache hit");
                    #[cfg(feature = "stats")]
                    self.stats.record_cache_hit();
                    let value = value.clone();
                    request.send_response(Ok(value));
                    return;
                }
                self.registry.register(request);
            }
            LoaderOp::Prime(key, value) => self.cache.store(std::iter::once((key, value))),
            LoaderOp::PrimeMany(key_vals) => self.cache.store(key_vals),
            LoaderOp::Clear(key) => self.cache.evict(std::slice::from_ref(&key)),
            LoaderOp::ClearMany(keys) => self.cache.evict(&keys),
            LoaderOp::ClearAll => {
                tracing::trace!(loader = %self.name, cached = self.cache.len(), "clearing cache");
                self.cache.evict_all();
            }
        }
    }

    #[tracing::instrument(skip(self), fields(loader = %self.name, mode = self.batch_fn.mode()))]
    async fn execute_load(&mut self) -> Result<(), ExecutorError> {
        let window = self.registry.take_window();
        if window.is_empty() {
            return Ok(());
        }
        let chunk_size = self.options.max_batch_size.unwrap_or(window.len()).max(1);
        let mut entries = window.into_iter();
        let mut chunks = Vec::new();
        loop {
            let chunk = entries.by_ref().take(chunk_size).collect::<Vec<_>>();
            if chunk.is_empty() {
                break;
            }
            chunks.push(chunk);
        }

        #[cfg(feature = "stats")]
        for chunk in &chunks {
            self.stats.record_load_exec(chunk.len() as u32);
        }

        let outcomes =
            join_all(chunks.into_iter().map(|chunk| dispatch_chunk(&self.batch_fn, &self.env, chunk)))
                .await;

        let mut shape_error = None;
        for outcome in outcomes {
            #[cfg(feature = "stats")]
            self.stats.record_load_exec_completed(outcome.loaded.len() as u32);
            self.cache.store(outcome.loaded);
            shape_error = shape_error.or(outcome.shape_error);
        }

        match shape_error {
            Some((expected, actual)) => {
                tracing::error!(expected, actual, "batch function broke the one-value-per-key contract");
                Err(ExecutorError::BatchShape { loader: self.name.clone(), expected, actual })
            }
            None => Ok(()),
        }
    }
}

async fn dispatch_chunk<K, V>(
    batch_fn: &BatchLoaderFn<K, V>,
    env: &BatchLoaderEnvironment,
    chunk: Vec<PendingEntry<K, V>>,
) -> ChunkOutcome<K, V>
where
    K: Eq + Hash + Debug + Clone + Send + Sync,
    V: Send + Debug + Clone,
{
    let keys = chunk.iter().map(|entry| entry.key.clone()).collect::<Vec<_>>();
    tracing::debug!(?keys, "dispatching batch");
    let loader = env.loader_name.clone();
    let mut outcome = ChunkOutcome::default();

    match batch_fn {
        BatchLoaderFn::List(f) => match f.load(&keys, env).await {
            Err(e) => fail_all(chunk, LoadError::BatchFailed { loader, message: e.to_string() }),
            Ok(values) if values.len() != keys.len() => {
                outcome.shape_error = Some((keys.len(), values.len()));
                fail_all(
                    chunk,
                    LoadError::BatchShape { loader, expected: keys.len(), actual: values.len() },
                );
            }
            Ok(values) => {
                for (entry, value) in chunk.into_iter().zip(values) {
                    outcome.loaded.push((entry.key.clone(), value.clone()));
                    entry.resolve(Ok(value));
                }
            }
        },
        BatchLoaderFn::Mapped(f) => match f.load(&keys, env).await {
            Err(e) => fail_all(chunk, LoadError::BatchFailed { loader, message: e.to_string() }),
            Ok(values) => {
                for entry in chunk {
                    match values.get(&entry.key) {
                        Some(value) => {
                            outcome.loaded.push((entry.key.clone(), value.clone()));
                            entry.resolve(Ok(value.clone()));
                        }
                        None => {
                            let key = format!("{:?}", entry.key);
                            tracing::debug!(%key, "key missing from mapped batch result");
                            entry.resolve(Err(LoadError::MissingKey { loader: loader.clone(), key }));
                        }
                    }
                }
            }
        },
    }
    outcome
}

fn fail_all<K, V>(chunk: Vec<PendingEntry<K, V>>, error: LoadError)
where
    V: Send + Debug + Clone,
{
    tracing::warn!(%error, keys = chunk.len(), "batch failed");
    for entry in chunk {
        entry.resolve(Err(error.clone()));
    }
}

#[async_trait]
impl<K, V, CacheT> PendingBatch for LoaderWorker<K, V, CacheT>
where
    K: 'static + Eq + Hash + Debug + Clone + Send + Sync,
    V: 'static + Send + Sync + Debug + Clone,
    CacheT: 'static + Cache<K = K, V = V> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn collect(&mut self) -> usize {
        while let Ok(op) = self.request_rx.try_recv() {
            self.mux_op(op);
        }
        if !self.registry.is_empty() {
            tracing::debug!(loader = %self.name, keys = ?self.registry.keys(), "window collected");
        }
        self.registry.len()
    }

    async fn dispatch(&mut self) -> Result<(), ExecutorError> {
        self.execute_load().await
    }

    fn cancel(&mut self) {
        while let Ok(op) = self.request_rx.try_recv() {
            if let LoaderOp::Load(request) = op {
                request.cancel(&self.name);
            }
        }
        let window = self.registry.take_window();
        if !window.is_empty() {
            tracing::debug!(loader = %self.name, keys = window.len(), "cancelling pending loads");
        }
        for entry in window {
            entry.cancel(&self.name);
        }
    }
}

impl<K, V, CacheT> Drop for LoaderWorker<K, V, CacheT>
where
    K: 'static + Eq + Hash + Debug + Clone + Send + Sync,
    V: 'static + Send + Sync + Debug + Clone,
    CacheT: 'static + Cache<K = K, V = V> + Send,
{
    fn drop(&mut self) {
        self.request_rx.close();
        self.cancel();
    }
}
