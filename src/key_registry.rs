use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use crate::loader_op::{LoadRequest, LoadResponse};

/// One key of a batch window together with every request waiting on it.
#[derive(Debug)]
pub struct PendingEntry<K, V> {
    pub key: K,
    waiters: Vec<LoadRequest<K, V>>,
}

impl<K, V> PendingEntry<K, V>
where
    V: Send + Debug + Clone,
{
    /// Resolves every waiter of this key with the same response.
    pub fn resolve(self, response: LoadResponse<V>) {
        let mut waiters = self.waiters.into_iter().peekable();
        while let Some(waiter) = waiters.next() {
            if waiters.peek().is_some() {
                waiter.send_response(response.clone());
            } else {
                waiter.send_response(response);
                break;
            }
        }
    }

    pub fn cancel(self, loader: &str) {
        for waiter in self.waiters {
            waiter.cancel(loader);
        }
    }
}

/// The keys registered since the last flush of one loader.
///
/// With deduplication, a key registered twice shares one entry and therefore one value. Without
/// it every registration is its own entry, but all of them still go out in the same batch.
#[derive(Debug)]
pub struct KeyRegistry<K, V> {
    entries: Vec<PendingEntry<K, V>>,
    index: HashMap<K, usize>,
    dedup: bool,
}

impl<K, V> KeyRegistry<K, V>
where
    K: Eq + Hash + Clone,
    V: Send + Debug + Clone,
{
    pub fn new(dedup: bool) -> Self {
        Self { entries: Vec::new(), index: HashMap::new(), dedup }
    }

    pub fn register(&mut self, request: LoadRequest<K, V>) {
        if self.dedup {
            if let Some(&position) = self.index.get(&request.key) {
                self.entries[position].waiters.push(request);
                return;
            }
            self.index.insert(request.key.clone(), self.entries.len());
        }
        self.entries.push(PendingEntry { key: request.key.clone(), waiters: vec![request] });
    }

    /// Keys of the open window in first-seen order.
    pub fn keys(&self) -> Vec<K> {
        self.entries.iter().map(|entry| entry.key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Closes the open window and hands its entries to the caller.
    pub fn take_window(&mut self) -> Vec<PendingEntry<K, V>> {
        self.index.clear();
        std::mem::take(&mut self.entries)
    }
}
