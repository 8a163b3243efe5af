use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dataload_gql::{
    BatchLoader, BatchLoaderEnvironment, BatchLoaderFn, BatchScheduler, BoxError, ExecutorError,
    LoadError, LoaderOptions, MappedBatchLoader, RequestContext,
};
use futures::future;

type Calls = Arc<Mutex<Vec<Vec<i64>>>>;

/// List loader over a fixed table; records every batch it receives.
struct DummyDataLoader {
    map: HashMap<i64, String>,
    calls: Calls,
}

#[async_trait]
impl BatchLoader<i64, String> for DummyDataLoader {
    async fn load(&self, keys: &[i64], _env: &BatchLoaderEnvironment) -> Result<Vec<String>, BoxError> {
        self.calls.lock().unwrap().push(keys.to_vec());
        Ok(keys.iter().map(|k| self.map.get(k).cloned().unwrap_or_default()).collect())
    }
}

/// Mapped loader that only knows some keys.
struct DummyMappedLoader {
    map: HashMap<i64, String>,
    calls: Calls,
}

#[async_trait]
impl MappedBatchLoader<i64, String> for DummyMappedLoader {
    async fn load(
        &self,
        keys: &[i64],
        _env: &BatchLoaderEnvironment,
    ) -> Result<HashMap<i64, String>, BoxError> {
        self.calls.lock().unwrap().push(keys.to_vec());
        // Reverse order on purpose: mapped results are matched by key.
        Ok(keys.iter().rev().filter_map(|k| self.map.get(k).cloned().map(|v| (*k, v))).collect())
    }
}

/// List loader that drops the last value.
struct ShortLoader;

#[async_trait]
impl BatchLoader<i64, String> for ShortLoader {
    async fn load(&self, keys: &[i64], _env: &BatchLoaderEnvironment) -> Result<Vec<String>, BoxError> {
        Ok(keys.iter().skip(1).map(|k| k.to_string()).collect())
    }
}

struct FailingLoader;

#[async_trait]
impl BatchLoader<i64, String> for FailingLoader {
    async fn load(&self, _keys: &[i64], _env: &BatchLoaderEnvironment) -> Result<Vec<String>, BoxError> {
        Err("database unavailable".into())
    }
}

fn fish() -> HashMap<i64, String> {
    let mut map = HashMap::new();
    map.insert(42, "one fish".to_owned());
    map.insert(12, "two fish".to_owned());
    map.insert(5, "red fish".to_owned());
    map.insert(8, "blue fish".to_owned());
    map
}

fn list_loader(calls: &Calls) -> BatchLoaderFn<i64, String> {
    BatchLoaderFn::list(DummyDataLoader { map: fish(), calls: calls.clone() })
}

fn mapped_loader(calls: &Calls) -> BatchLoaderFn<i64, String> {
    BatchLoaderFn::mapped(DummyMappedLoader { map: fish(), calls: calls.clone() })
}

fn ok(value: &str) -> Result<String, LoadError> {
    Ok(value.to_owned())
}

#[tokio::test]
async fn basic_load() {
    let calls = Calls::default();
    let mut scheduler = BatchScheduler::new();
    let loader = scheduler.register("fish", list_loader(&calls), LoaderOptions::default(), RequestContext::empty());

    let value = scheduler.run(loader.load(42)).await.unwrap();
    assert_eq!(value, ok("one fish"));
    assert_eq!(*calls.lock().unwrap(), vec![vec![42]]);
}

#[tokio::test]
async fn duplicate_keys_in_one_pass_share_one_batch_in_first_seen_order() {
    let calls = Calls::default();
    let mut scheduler = BatchScheduler::new();
    let loader = scheduler.register("fish", list_loader(&calls), LoaderOptions::default(), RequestContext::empty());

    let results = scheduler
        .run(future::join5(loader.load(12), loader.load(5), loader.load(12), loader.load(8), loader.load(5)))
        .await
        .unwrap();

    assert_eq!(results, (ok("two fish"), ok("red fish"), ok("two fish"), ok("blue fish"), ok("red fish")));
    assert_eq!(*calls.lock().unwrap(), vec![vec![12, 5, 8]]);
}

#[tokio::test]
async fn list_mode_resolves_by_position() {
    let calls = Calls::default();
    let mut scheduler = BatchScheduler::new();
    let loader = scheduler.register("fish", list_loader(&calls), LoaderOptions::default(), RequestContext::empty());

    let values = scheduler.run(loader.load_many(vec![5, 12, 8])).await.unwrap();
    assert_eq!(values, vec![ok("red fish"), ok("two fish"), ok("blue fish")]);
}

#[tokio::test]
async fn mapped_mode_resolves_by_key_and_isolates_missing_keys() {
    let calls = Calls::default();
    let mut scheduler = BatchScheduler::new();
    let loader = scheduler.register("fish", mapped_loader(&calls), LoaderOptions::default(), RequestContext::empty());

    let values = scheduler.run(loader.load_many(vec![5, 99, 42])).await.unwrap();
    assert_eq!(
        values,
        vec![
            ok("red fish"),
            Err(LoadError::MissingKey { loader: "fish".to_owned(), key: "99".to_owned() }),
            ok("one fish"),
        ]
    );
    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn nested_joins_still_share_one_batch() {
    let calls = Calls::default();
    let mut scheduler = BatchScheduler::new();
    let loader = scheduler.register("fish", list_loader(&calls), LoaderOptions::default(), RequestContext::empty());

    let tuple = future::join4(
        loader.load(5),
        loader.load_many(vec![5, 42]),
        async { future::join(loader.load(8), loader.load(12)).await },
        loader.load(12),
    );
    let (a, b, (c, d), e) = scheduler.run(tuple).await.unwrap();

    assert_eq!(a, ok("red fish"));
    assert_eq!(b, vec![ok("red fish"), ok("one fish")]);
    assert_eq!((c, d), (ok("blue fish"), ok("two fish")));
    assert_eq!(e, ok("two fish"));
    assert_eq!(*calls.lock().unwrap(), vec![vec![5, 42, 8, 12]]);
}

#[tokio::test]
async fn chained_loads_open_a_new_window() {
    let calls = Calls::default();
    let mut scheduler = BatchScheduler::new();
    let loader = scheduler.register(
        "fish",
        list_loader(&calls),
        LoaderOptions::default().without_caching(),
        RequestContext::empty(),
    );

    let chained = async {
        let first = loader.load(5).await;
        let second = loader.load(8).await;
        (first, second)
    };
    let (first, second) = scheduler.run(future::join(chained, loader.load(42))).await.unwrap().0;

    assert_eq!((first, second), (ok("red fish"), ok("blue fish")));
    assert_eq!(*calls.lock().unwrap(), vec![vec![5, 42], vec![8]]);
}

#[tokio::test]
async fn cached_keys_skip_the_batch_function() {
    let calls = Calls::default();
    let mut scheduler = BatchScheduler::new();
    let loader = scheduler.register("fish", list_loader(&calls), LoaderOptions::default(), RequestContext::empty());

    let repeated = async {
        let first = loader.load(42).await;
        let second = loader.load(42).await;
        loader.prime(7, "primed fish".to_owned());
        let primed = loader.load(7).await;
        loader.clear(42);
        let reloaded = loader.load(42).await;
        (first, second, primed, reloaded)
    };
    let results = scheduler.run(repeated).await.unwrap();

    assert_eq!(results, (ok("one fish"), ok("one fish"), ok("primed fish"), ok("one fish")));
    assert_eq!(*calls.lock().unwrap(), vec![vec![42], vec![42]]);
}

#[tokio::test]
async fn no_dedup_passes_every_registration() {
    let calls = Calls::default();
    let mut scheduler = BatchScheduler::new();
    let loader = scheduler.register(
        "fish",
        list_loader(&calls),
        LoaderOptions::default().without_dedup(),
        RequestContext::empty(),
    );

    let results = scheduler.run(future::join3(loader.load(8), loader.load(5), loader.load(8))).await.unwrap();

    assert_eq!(results, (ok("blue fish"), ok("red fish"), ok("blue fish")));
    assert_eq!(*calls.lock().unwrap(), vec![vec![8, 5, 8]]);
}

#[tokio::test]
async fn max_batch_size_splits_the_window() {
    let calls = Calls::default();
    let mut scheduler = BatchScheduler::new();
    let loader = scheduler.register(
        "fish",
        list_loader(&calls),
        LoaderOptions::default().with_max_batch_size(2),
        RequestContext::empty(),
    );

    let values = scheduler.run(loader.load_many(vec![42, 12, 5, 8, 12])).await.unwrap();

    assert_eq!(values, vec![ok("one fish"), ok("two fish"), ok("red fish"), ok("blue fish"), ok("two fish")]);
    assert_eq!(*calls.lock().unwrap(), vec![vec![42, 12], vec![5, 8]]);
}

#[tokio::test]
async fn batch_function_errors_stay_with_their_keys() {
    let mut scheduler = BatchScheduler::new();
    let loader =
        scheduler.register("broken", BatchLoaderFn::list(FailingLoader), LoaderOptions::default(), RequestContext::empty());

    let value = scheduler.run(loader.load(1)).await.unwrap();
    assert_eq!(
        value,
        Err(LoadError::BatchFailed { loader: "broken".to_owned(), message: "database unavailable".to_owned() })
    );
}

#[tokio::test]
async fn shape_errors_abort_the_run() {
    let mut scheduler = BatchScheduler::new();
    let loader =
        scheduler.register("short", BatchLoaderFn::list(ShortLoader), LoaderOptions::default(), RequestContext::empty());

    let err = scheduler.run(loader.load_many(vec![1, 2, 3])).await.unwrap_err();
    assert!(matches!(
        err,
        ExecutorError::BatchShape { ref loader, expected: 3, actual: 2 } if loader == "short"
    ));
}

#[tokio::test]
async fn loads_after_the_run_are_cancelled() {
    let calls = Calls::default();
    let mut scheduler = BatchScheduler::new();
    let loader = scheduler.register("fish", list_loader(&calls), LoaderOptions::default(), RequestContext::empty());
    drop(scheduler);

    assert_eq!(loader.load(5).await, Err(LoadError::Cancelled { loader: "fish".to_owned() }));
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn loads_after_a_completed_run_are_cancelled() {
    let calls = Calls::default();
    let mut scheduler = BatchScheduler::new();
    let loader = scheduler.register("fish", list_loader(&calls), LoaderOptions::default(), RequestContext::empty());

    assert_eq!(scheduler.run(loader.load(42)).await.unwrap(), ok("one fish"));

    let late = tokio::time::timeout(std::time::Duration::from_millis(500), loader.load(5)).await;
    assert_eq!(late.ok(), Some(Err(LoadError::Cancelled { loader: "fish".to_owned() })));
    assert_eq!(*calls.lock().unwrap(), vec![vec![42]]);
}

#[tokio::test]
async fn waits_for_external_work_before_flushing() {
    let calls = Calls::default();
    let mut scheduler = BatchScheduler::new();
    let loader = scheduler.register("fish", list_loader(&calls), LoaderOptions::default(), RequestContext::empty());

    let delayed = async {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        loader.load(8).await
    };
    let (delayed, immediate) = scheduler.run(future::join(delayed, loader.load(5))).await.unwrap();

    assert_eq!((delayed, immediate), (ok("blue fish"), ok("red fish")));
    assert_eq!(*calls.lock().unwrap(), vec![vec![5], vec![8]]);
}
