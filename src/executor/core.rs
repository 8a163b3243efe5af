//! Core query executor orchestration

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use graphql_parser::query::{
    parse_query, Definition, Document, OperationDefinition, SelectionSet, VariableDefinition,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing_futures::Instrument;

use super::field_resolver::{self, ExecutionContext, NullBubble};
use super::json_path;
use super::result::{ErrorClassification, ExecutionResult, GraphQLError};
use super::utils;
use crate::batch_function::BatchLoaderFn;
use crate::config::{ExecutorConfig, LoaderOptions};
use crate::context::{ContextBuilder, ExecutionInput, RequestContext};
use crate::error::ExecutorError;
use crate::fetcher::{DataFetcher, FetcherRegistry};
use crate::registry::BatchLoaderRegistry;
use crate::scheduler::BatchScheduler;
use crate::schema::Schema;

/// Lifecycle of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecutionPhase {
    Created,
    BuildingContext,
    Resolving,
    Serializing,
    Completed,
    Failed,
}

impl ExecutionPhase {
    fn advance(&mut self, next: ExecutionPhase) {
        tracing::debug!(from = ?*self, to = ?next, "execution phase");
        *self = next;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperationKind {
    Query,
    Mutation,
}

struct Operation<'a> {
    kind: OperationKind,
    selection_set: &'a SelectionSet<'a, String>,
    variable_definitions: &'a [VariableDefinition<'a, String>],
}

/// Executes GraphQL queries against a schema, registered fetchers and batch loaders.
///
/// Built once with [`QueryExecutor::builder`]; every call to [`QueryExecutor::execute`] gets its
/// own context, loaders and batch scheduler, so concurrent executions share no loading state.
#[derive(Clone)]
pub struct QueryExecutor {
    schema: Arc<Schema>,
    fetchers: FetcherRegistry,
    loaders: BatchLoaderRegistry,
    context_builder: Option<Arc<dyn ContextBuilder>>,
}

impl fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("query_type", &self.schema.query_type())
            .field("loaders", &self.loaders.len())
            .field("context_builder", &self.context_builder.is_some())
            .finish()
    }
}

impl QueryExecutor {
    pub fn builder(config: ExecutorConfig) -> QueryExecutorBuilder {
        QueryExecutorBuilder {
            config,
            inline_schemas: Vec::new(),
            fetchers: FetcherRegistry::new(),
            loaders: BatchLoaderRegistry::new(),
            context_builder: None,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Execute a query and return its result.
    pub async fn execute(&self, query: &str, variables: Option<Map<String, Value>>) -> ExecutionResult {
        self.execute_input(ExecutionInput::new(query).with_variables(variables.unwrap_or_default()))
            .await
    }

    pub async fn execute_input(&self, input: ExecutionInput) -> ExecutionResult {
        let span = tracing::debug_span!("execute", operation = ?input.operation_name);
        self.run(input).instrument(span).await
    }

    /// Execute a query and read the value at `path` of the serialized result as `T`.
    ///
    /// Fails if the result carries any error, if the path does not resolve, or if the value
    /// cannot be deserialized into `T`.
    pub async fn execute_and_extract_json_path<T: DeserializeOwned>(
        &self,
        query: &str,
        path: &str,
    ) -> Result<T, ExecutorError> {
        self.execute_and_extract_json_path_with_variables(query, Map::new(), path).await
    }

    pub async fn execute_and_extract_json_path_with_variables<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Map<String, Value>,
        path: &str,
    ) -> Result<T, ExecutorError> {
        let result = self.execute(query, Some(variables)).await;
        if !result.errors.is_empty() {
            return Err(ExecutorError::QueryFailed { errors: result.errors });
        }
        Ok(json_path::extract(&result.to_json(), path)?)
    }

    async fn run(&self, input: ExecutionInput) -> ExecutionResult {
        let mut phase = ExecutionPhase::Created;

        let document = match parse_query::<String>(&input.query) {
            Ok(document) => document,
            Err(e) => {
                phase.advance(ExecutionPhase::Failed);
                return ExecutionResult::failed(
                    GraphQLError::new(format!("Invalid query: {}", e))
                        .with_classification(ErrorClassification::InvalidSyntax),
                );
            }
        };
        let operation = match select_operation(&document, input.operation_name.as_deref()) {
            Ok(operation) => operation,
            Err(message) => {
                phase.advance(ExecutionPhase::Failed);
                return ExecutionResult::failed(
                    GraphQLError::new(message).with_classification(ErrorClassification::ValidationError),
                );
            }
        };
        let root_type = match operation.kind {
            OperationKind::Query => Some(self.schema.query_type()),
            OperationKind::Mutation => self.schema.mutation_type(),
        };
        let Some(root_type) = root_type else {
            phase.advance(ExecutionPhase::Failed);
            return ExecutionResult::failed(
                GraphQLError::new("Schema is not configured for mutations")
                    .with_classification(ErrorClassification::ValidationError),
            );
        };

        phase.advance(ExecutionPhase::BuildingContext);
        let context = match &self.context_builder {
            Some(builder) => match builder.build(&input).await {
                Ok(context) => context,
                Err(e) => {
                    let error = ExecutorError::ContextBuild(e);
                    tracing::warn!(%error, "aborting execution");
                    phase.advance(ExecutionPhase::Failed);
                    return ExecutionResult::failed(
                        GraphQLError::new(error.to_string())
                            .with_classification(ErrorClassification::ExecutionAborted),
                    );
                }
            },
            None => RequestContext::empty(),
        };

        phase.advance(ExecutionPhase::Resolving);
        let mut scheduler = BatchScheduler::new();
        let loaders = self.loaders.instantiate(&mut scheduler, &context);
        let variables = utils::with_variable_defaults(operation.variable_definitions, input.variables.clone());
        let fragments = document
            .definitions
            .iter()
            .filter_map(|definition| match definition {
                Definition::Fragment(fragment) => Some((fragment.name.as_str(), fragment)),
                Definition::Operation(_) => None,
            })
            .collect::<HashMap<_, _>>();
        let ctx = ExecutionContext::new(&self.schema, &self.fetchers, &context, &loaders, &variables, fragments);

        let resolution = field_resolver::resolve_selection_set(
            &ctx,
            root_type,
            Value::Null,
            vec![operation.selection_set.items.as_slice()],
            Vec::new(),
            operation.kind == OperationKind::Mutation,
        );
        let outcome = scheduler.run(resolution).await;

        phase.advance(ExecutionPhase::Serializing);
        let mut errors = ctx.take_errors();
        let data = match outcome {
            Ok(Ok(data)) => data,
            Ok(Err(NullBubble)) => Value::Null,
            Err(fatal) => {
                tracing::error!(error = %fatal, "execution failed");
                phase.advance(ExecutionPhase::Failed);
                errors.push(
                    GraphQLError::new(fatal.to_string())
                        .with_classification(ErrorClassification::ExecutionAborted),
                );
                return ExecutionResult { data: Some(Value::Null), errors };
            }
        };
        phase.advance(ExecutionPhase::Completed);
        ExecutionResult { data: Some(data), errors }
    }
}

fn select_operation<'a>(
    document: &'a Document<'a, String>,
    operation_name: Option<&str>,
) -> Result<Operation<'a>, String> {
    let mut operations = document.definitions.iter().filter_map(|definition| match definition {
        Definition::Operation(operation) => Some(operation),
        Definition::Fragment(_) => None,
    });

    let operation = match operation_name {
        Some(name) => operations
            .find(|operation| operation_name_of(operation) == Some(name))
            .ok_or_else(|| format!("Unknown operation named '{}'", name))?,
        None => {
            let first = operations.next().ok_or_else(|| "No operation found in query".to_owned())?;
            if operations.next().is_some() {
                return Err("Must provide operation name if query contains multiple operations".to_owned());
            }
            first
        }
    };

    match operation {
        OperationDefinition::SelectionSet(selection_set) => {
            Ok(Operation { kind: OperationKind::Query, selection_set, variable_definitions: &[] })
        }
        OperationDefinition::Query(query) => Ok(Operation {
            kind: OperationKind::Query,
            selection_set: &query.selection_set,
            variable_definitions: &query.variable_definitions,
        }),
        OperationDefinition::Mutation(mutation) => Ok(Operation {
            kind: OperationKind::Mutation,
            selection_set: &mutation.selection_set,
            variable_definitions: &mutation.variable_definitions,
        }),
        OperationDefinition::Subscription(_) => Err("Subscriptions are not supported".to_owned()),
    }
}

fn operation_name_of<'b>(operation: &'b OperationDefinition<'_, String>) -> Option<&'b str> {
    match operation {
        OperationDefinition::SelectionSet(_) => None,
        OperationDefinition::Query(query) => query.name.as_deref(),
        OperationDefinition::Mutation(mutation) => mutation.name.as_deref(),
        OperationDefinition::Subscription(subscription) => subscription.name.as_deref(),
    }
}

/// Collects the schema source and the registrations of a [`QueryExecutor`].
pub struct QueryExecutorBuilder {
    config: ExecutorConfig,
    inline_schemas: Vec<String>,
    fetchers: FetcherRegistry,
    loaders: BatchLoaderRegistry,
    context_builder: Option<Arc<dyn ContextBuilder>>,
}

impl QueryExecutorBuilder {
    /// Adds a schema definition in addition to the files found under the configured locations.
    pub fn schema_sdl(mut self, sdl: impl Into<String>) -> Self {
        self.inline_schemas.push(sdl.into());
        self
    }

    pub fn data_fetcher<F: DataFetcher + 'static>(
        mut self,
        parent_type: impl Into<String>,
        field_name: impl Into<String>,
        fetcher: F,
    ) -> Self {
        self.fetchers.register(parent_type, field_name, fetcher);
        self
    }

    /// Registers a batch loader with the configured default options.
    pub fn batch_loader<K, V>(self, name: impl Into<String>, batch_fn: BatchLoaderFn<K, V>) -> Self
    where
        K: 'static + Eq + std::hash::Hash + fmt::Debug + Clone + Send + Sync,
        V: 'static + Send + Sync + fmt::Debug + Clone,
    {
        let options = self.config.data_loaders;
        self.batch_loader_with_options(name, batch_fn, options)
    }

    pub fn batch_loader_with_options<K, V>(
        mut self,
        name: impl Into<String>,
        batch_fn: BatchLoaderFn<K, V>,
        options: LoaderOptions,
    ) -> Self
    where
        K: 'static + Eq + std::hash::Hash + fmt::Debug + Clone + Send + Sync,
        V: 'static + Send + Sync + fmt::Debug + Clone,
    {
        self.loaders.register(name, batch_fn, options);
        self
    }

    /// Sets the context builder. Only one may be registered; a later call replaces it.
    pub fn context_builder<B: ContextBuilder + 'static>(mut self, builder: B) -> Self {
        if self.context_builder.is_some() {
            tracing::warn!("context builder registered twice; keeping the last one");
        }
        self.context_builder = Some(Arc::new(builder));
        self
    }

    /// Loads the schema and freezes the registrations.
    ///
    /// Fails with [`ExecutorError::SchemaNotFound`] when neither the configured locations nor
    /// the inline definitions provide a schema.
    pub fn build(self) -> Result<QueryExecutor, ExecutorError> {
        let schema = Schema::load(&self.config.schema_locations, &self.inline_schemas)?;

        for (parent_type, field) in self.fetchers.coordinates() {
            if schema.field(parent_type, field).is_none() {
                tracing::warn!(parent_type, field, "data fetcher registered for a field missing from the schema");
            }
        }
        tracing::info!(
            query_type = schema.query_type(),
            loaders = self.loaders.len(),
            context_builder = self.context_builder.is_some(),
            "query executor ready"
        );

        Ok(QueryExecutor {
            schema: Arc::new(schema),
            fetchers: self.fetchers,
            loaders: self.loaders,
            context_builder: self.context_builder,
        })
    }
}
