mod batch_function;
mod cache;
pub mod config;
mod context;
mod error;
pub mod executor;
mod fetcher;
mod key_registry;
mod loader;
mod loader_op;
mod loader_worker;
mod registry;
mod scheduler;
pub mod schema;
#[cfg(feature = "stats")]
mod worker_stats;

pub use batch_function::{BatchLoader, BatchLoaderEnvironment, BatchLoaderFn, MappedBatchLoader};
pub use config::{ExecutorConfig, LoaderOptions};
pub use context::{ContextBuilder, ExecutionInput, RequestContext};
pub use error::{BoxError, ExecutorError, ExtractionError, LoadError};
pub use executor::{ExecutionResult, GraphQLError, QueryExecutor, QueryExecutorBuilder};
pub use fetcher::{DataFetcher, DataFetchingEnvironment, FetcherRegistry, StaticFetcher};
pub use loader::Loader;
pub use registry::{BatchLoaderRegistry, DataLoaderRegistry};
pub use scheduler::BatchScheduler;
