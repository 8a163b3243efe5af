//! Named batch loader registrations and their per-execution instances.

use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use crate::{
    batch_function::BatchLoaderFn,
    config::LoaderOptions,
    context::RequestContext,
    error::LoadError,
    loader::Loader,
    scheduler::BatchScheduler,
};

/// A batch loader registered once at build time, instantiated for every execution.
trait LoaderRegistration: Send + Sync {
    fn mode(&self) -> &'static str;

    /// Creates this execution's loader on `scheduler` and returns its type-erased handle.
    fn instantiate(
        &self,
        name: &str,
        scheduler: &mut BatchScheduler,
        context: RequestContext,
    ) -> Box<dyn Any + Send + Sync>;
}

struct TypedRegistration<K, V> {
    batch_fn: BatchLoaderFn<K, V>,
    options: LoaderOptions,
}

impl<K, V> LoaderRegistration for TypedRegistration<K, V>
where
    K: 'static + Eq + Hash + Debug + Clone + Send + Sync,
    V: 'static + Send + Sync + Debug + Clone,
{
    fn mode(&self) -> &'static str {
        self.batch_fn.mode()
    }

    fn instantiate(
        &self,
        name: &str,
        scheduler: &mut BatchScheduler,
        context: RequestContext,
    ) -> Box<dyn Any + Send + Sync> {
        Box::new(scheduler.register(name, self.batch_fn.clone(), self.options, context))
    }
}

/// Every batch loader known to an executor, by name.
#[derive(Default, Clone)]
pub struct BatchLoaderRegistry {
    registrations: HashMap<String, Arc<dyn LoaderRegistration>>,
}

impl BatchLoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a loader; a later registration under the same name replaces the earlier one.
    pub fn register<K, V>(
        &mut self,
        name: impl Into<String>,
        batch_fn: BatchLoaderFn<K, V>,
        options: LoaderOptions,
    ) where
        K: 'static + Eq + Hash + Debug + Clone + Send + Sync,
        V: 'static + Send + Sync + Debug + Clone,
    {
        let name = name.into();
        tracing::debug!(loader = %name, mode = batch_fn.mode(), ?options, "registering batch loader");
        if self
            .registrations
            .insert(name.clone(), Arc::new(TypedRegistration { batch_fn, options }))
            .is_some()
        {
            tracing::warn!(loader = %name, "batch loader registered twice; keeping the last one");
        }
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Creates fresh loaders for one execution, all driven by `scheduler`.
    pub fn instantiate(
        &self,
        scheduler: &mut BatchScheduler,
        context: &RequestContext,
    ) -> DataLoaderRegistry {
        let loaders = self
            .registrations
            .iter()
            .map(|(name, registration)| {
                tracing::trace!(loader = %name, mode = registration.mode(), "instantiating loader");
                (name.clone(), registration.instantiate(name, scheduler, context.clone()))
            })
            .collect();
        DataLoaderRegistry { loaders }
    }
}

/// The loaders of one execution, looked up by name from fetchers.
pub struct DataLoaderRegistry {
    loaders: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl DataLoaderRegistry {
    /// Returns the loader registered under `name` with key type `K` and value type `V`.
    pub fn get<K, V>(&self, name: &str) -> Result<&Loader<K, V>, LoadError>
    where
        K: 'static,
        V: 'static,
    {
        let loader = self
            .loaders
            .get(name)
            .ok_or_else(|| LoadError::NotRegistered { loader: name.to_owned() })?;
        loader
            .downcast_ref::<Loader<K, V>>()
            .ok_or_else(|| LoadError::TypeMismatch { loader: name.to_owned() })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::batch_function::{BatchLoaderEnvironment, MappedBatchLoader};
    use crate::error::BoxError;

    struct Echo;

    #[async_trait]
    impl MappedBatchLoader<u32, String> for Echo {
        async fn load(
            &self,
            keys: &[u32],
            _env: &BatchLoaderEnvironment,
        ) -> Result<HashMap<u32, String>, BoxError> {
            Ok(keys.iter().map(|k| (*k, k.to_string())).collect())
        }
    }

    #[test]
    fn lookups_check_name_and_types() {
        let mut registrations = BatchLoaderRegistry::new();
        registrations.register("echo", BatchLoaderFn::mapped(Echo), LoaderOptions::default());

        let mut scheduler = BatchScheduler::new();
        let loaders = registrations.instantiate(&mut scheduler, &RequestContext::empty());
        assert_eq!(scheduler.loader_count(), 1);

        assert!(loaders.get::<u32, String>("echo").is_ok());
        assert_eq!(
            loaders.get::<String, String>("echo").unwrap_err(),
            LoadError::TypeMismatch { loader: "echo".to_owned() }
        );
        assert_eq!(
            loaders.get::<u32, String>("other").unwrap_err(),
            LoadError::NotRegistered { loader: "other".to_owned() }
        );
    }
}
