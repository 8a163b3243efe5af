use tokio::sync::oneshot;

use crate::error::LoadError;

pub type LoadResponse<V> = Result<V, LoadError>;

/// Set of possible requests that can be sent to the [`LoaderWorker`]
///
/// The three categories of commands are Load, Prime, and Clear; Prime and Clear have single and
/// many variants for convenience.
///
/// [`LoaderWorker`]: crate::loader_worker::LoaderWorker
#[derive(Debug)]
pub enum LoaderOp<K, V> {
    /// Fetch data from the resource wrapped by this data loader (or the cache).
    Load(LoadRequest<K, V>),
    /// Add values to the cache that were fetched from elsewhere.
    Prime(K, V),
    PrimeMany(Vec<(K, V)>),
    /// Remove values from the cache so that they will be reloaded when they are next requested.
    Clear(K),
    ClearMany(Vec<K>),
    ClearAll,
}

/// One key requested by one resolver, with the channel its placeholder is waiting on.
#[derive(Debug)]
pub struct LoadRequest<K, V> {
    pub key: K,
    response_tx: oneshot::Sender<LoadResponse<V>>,
}

impl<K, V> LoadRequest<K, V>
where
    V: Send + std::fmt::Debug,
{
    pub fn new(key: K) -> (Self, oneshot::Receiver<LoadResponse<V>>) {
        let (response_tx, response_rx) = oneshot::channel();
        (Self { key, response_tx }, response_rx)
    }

    pub fn send_response(self, response: LoadResponse<V>) {
        if let Err(e) = self.response_tx.send(response) {
            tracing::error!(?e, "receiver dropped");
        }
    }

    /// Resolves the request with a cancellation error.
    ///
    /// The receiver is usually gone already when an execution is torn down, so a failed send is
    /// not reported.
    pub fn cancel(self, loader: &str) {
        let _ = self.response_tx.send(Err(LoadError::Cancelled { loader: loader.to_owned() }));
    }
}
