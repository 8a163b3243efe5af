use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;

/// Values a loader has already fetched during the current execution.
///
/// A hit answers the load request without going through a batch window.
pub trait Cache {
    type K;
    type V;

    fn lookup(&self, key: &Self::K) -> Option<&Self::V>;

    /// Stores values produced by the batch function or primed by a resolver.
    fn store<I: IntoIterator<Item = (Self::K, Self::V)>>(&mut self, entries: I);

    fn evict(&mut self, keys: &[Self::K]);
    fn evict_all(&mut self);

    fn len(&self) -> usize;
}

impl<K, V, S: BuildHasher> Cache for HashMap<K, V, S>
where
    K: Eq + Hash,
{
    type K = K;
    type V = V;

    fn lookup(&self, key: &K) -> Option<&V> {
        self.get(key)
    }

    fn store<I: IntoIterator<Item = (K, V)>>(&mut self, entries: I) {
        self.extend(entries);
    }

    fn evict(&mut self, keys: &[K]) {
        for key in keys {
            self.remove(key);
        }
    }

    fn evict_all(&mut self) {
        self.clear();
    }

    fn len(&self) -> usize {
        HashMap::len(self)
    }
}

/// Cache of a loader with caching turned off: nothing is kept, every load goes to a batch.
pub struct NoCache<K, V>(PhantomData<fn() -> (K, V)>);

impl<K, V> Default for NoCache<K, V> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<K, V> Cache for NoCache<K, V> {
    type K = K;
    type V = V;

    fn lookup(&self, _key: &K) -> Option<&V> {
        None
    }

    fn store<I: IntoIterator<Item = (K, V)>>(&mut self, _entries: I) {}

    fn evict(&mut self, _keys: &[K]) {}

    fn evict_all(&mut self) {}

    fn len(&self) -> usize {
        0
    }
}
