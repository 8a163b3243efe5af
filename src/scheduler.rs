use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::task::Poll;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Notify;

use crate::{
    batch_function::{BatchLoaderEnvironment, BatchLoaderFn},
    cache::NoCache,
    config::LoaderOptions,
    context::RequestContext,
    error::ExecutorError,
    loader::Loader,
};

/// The scheduler's view of one loader's worker, independent of its key and value types.
#[async_trait]
pub trait PendingBatch: Send {
    fn name(&self) -> &str;

    /// Moves queued requests into the open batch window and returns how many keys it holds.
    fn collect(&mut self) -> usize;

    /// Flushes the open window through the batch function.
    ///
    /// Only fatal errors are returned; per-key failures are delivered to the waiting requests.
    async fn dispatch(&mut self) -> Result<(), ExecutorError>;

    /// Resolves every queued or staged request with a cancellation error.
    fn cancel(&mut self);
}

/// Decides when the loaders of one execution flush their batch windows.
///
/// [`BatchScheduler::run`] drives a resolution future in passes. A pass polls the future until it
/// cannot make progress, which means every resolver scheduled in that pass has either finished or
/// is suspended on a pending load. Only then are the windows collected and flushed, after which
/// the resolvers are resumed by the next pass. Keys requested within the same pass therefore
/// always share a batch.
///
/// A scheduler and its loaders belong to exactly one execution.
pub struct BatchScheduler {
    workers: Vec<Box<dyn PendingBatch>>,
    wake: Arc<Notify>,
}

impl Default for BatchScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchScheduler {
    pub fn new() -> Self {
        Self { workers: Vec::new(), wake: Arc::new(Notify::new()) }
    }

    /// Creates a loader driven by this scheduler.
    pub fn register<K, V>(
        &mut self,
        name: impl Into<String>,
        batch_fn: BatchLoaderFn<K, V>,
        options: LoaderOptions,
        context: RequestContext,
    ) -> Loader<K, V>
    where
        K: 'static + Eq + Hash + Debug + Clone + Send + Sync,
        V: 'static + Send + Sync + Debug + Clone,
    {
        let env = BatchLoaderEnvironment { loader_name: name.into(), context };
        let wake = Arc::clone(&self.wake);
        if options.caching {
            let (loader, worker) = Loader::new(batch_fn, options, HashMap::new(), env, wake);
            self.workers.push(Box::new(worker));
            loader
        } else {
            let (loader, worker) = Loader::new(batch_fn, options, NoCache::default(), env, wake);
            self.workers.push(Box::new(worker));
            loader
        }
    }

    pub fn loader_count(&self) -> usize {
        self.workers.len()
    }

    /// Drives `resolution` to completion, flushing batch windows between resolution passes.
    ///
    /// A fatal batch error aborts the resolution: the future is dropped, every outstanding load
    /// is cancelled and the error is returned. Requests still queued after a successful
    /// resolution are cancelled as well.
    ///
    /// The scheduler is consumed together with its workers, so loads issued through its loaders
    /// after `run` returns resolve with [`LoadError::Cancelled`].
    ///
    /// [`LoadError::Cancelled`]: crate::LoadError::Cancelled
    pub async fn run<F: Future>(mut self, resolution: F) -> Result<F::Output, ExecutorError> {
        futures::pin_mut!(resolution);
        let wake = Arc::clone(&self.wake);
        let mut frames = 0usize;
        loop {
            if let Poll::Ready(output) = futures::poll!(resolution.as_mut()) {
                tracing::debug!(frames, "resolution complete");
                self.cancel_all();
                return Ok(output);
            }

            // Every resolver of this pass is suspended; the windows are now complete.
            if self.collect_all() > 0 {
                frames += 1;
                if let Err(e) = self.dispatch_all().await {
                    self.cancel_all();
                    return Err(e);
                }
                continue;
            }

            // Nothing to flush: the resolution is waiting on something external.
            tokio::select! {
                biased;
                output = resolution.as_mut() => {
                    tracing::debug!(frames, "resolution complete");
                    self.cancel_all();
                    return Ok(output);
                }
                _ = wake.notified() => {}
            }
        }
    }

    fn collect_all(&mut self) -> usize {
        self.workers.iter_mut().map(|worker| worker.collect()).sum()
    }

    async fn dispatch_all(&mut self) -> Result<(), ExecutorError> {
        let results = join_all(self.workers.iter_mut().map(|worker| worker.dispatch())).await;
        results.into_iter().collect()
    }

    /// Cancels every outstanding load of every loader.
    pub fn cancel_all(&mut self) {
        for worker in self.workers.iter_mut() {
            tracing::trace!(loader = worker.name(), "cancelling outstanding loads");
            worker.cancel();
        }
    }
}
