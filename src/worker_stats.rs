/// Batching statistics of one loader over one execution, logged when the loader is dropped.
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Name of the loader these stats belong to.
    loader: String,
    /// Number of `LoaderOp::Load` that were received by the worker.
    load_requests: u32,
    /// The number of requests that were immediately answered from the loader cache.
    cache_hits: u32,
    /// Number of times that this worker invoked its batch function.
    loads: u32,
    /// The average number of keys handed to the batch function per call.
    average_batch_size: f32,
    /// The max number of keys handed to the batch function in a single call.
    max_batch_size: u32,
    /// The min number of keys handed to the batch function in a single call.
    min_batch_size: u32,
    /// The total number of keys that produced a value.
    items_loaded: u32,
}

impl WorkerStats {
    pub fn new(loader: &str) -> Self {
        Self { loader: loader.to_owned(), min_batch_size: u32::MAX, ..Default::default() }
    }

    pub fn record_load_request(&mut self) {
        self.load_requests += 1;
    }

    pub fn record_cache_hit(&mut self) {
        self.cache_hits += 1;
    }

    pub fn record_load_exec(&mut self, batch_size: u32) {
        let new_total_load = self.loads + 1;
        self.average_batch_size = (((self.average_batch_size as f64 * self.loads as f64)
            + batch_size as f64)
            / new_total_load as f64) as f32;
        self.loads = new_total_load;
        self.max_batch_size = self.max_batch_size.max(batch_size);
        self.min_batch_size = self.min_batch_size.min(batch_size);
    }

    pub fn record_load_exec_completed(&mut self, loaded_item_count: u32) {
        self.items_loaded += loaded_item_count;
    }
}

impl Drop for WorkerStats {
    fn drop(&mut self) {
        tracing::debug!(worker_stats = ?self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_batch_sizes() {
        let mut stats = WorkerStats::new("names");
        stats.record_load_exec(4);
        stats.record_load_exec(2);
        assert_eq!(stats.loads, 2);
        assert_eq!(stats.max_batch_size, 4);
        assert_eq!(stats.min_batch_size, 2);
        assert!((stats.average_batch_size - 3.0).abs() < f32::EPSILON);
    }
}
