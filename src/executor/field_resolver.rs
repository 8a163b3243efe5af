//! Field resolution and value completion

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use futures::future::{join_all, BoxFuture, FutureExt};
use graphql_parser::query::{Field, FragmentDefinition, Selection, TypeCondition};
use serde_json::{Map, Value};

use super::result::{ErrorClassification, GraphQLError, PathSegment};
use super::utils;
use crate::context::RequestContext;
use crate::fetcher::{DataFetchingEnvironment, FetcherRegistry};
use crate::registry::DataLoaderRegistry;
use crate::schema::{Schema, TypeRef};

/// A null that has to replace the nearest nullable parent.
///
/// The error that caused it has already been recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NullBubble;

pub type Completion = Result<Value, NullBubble>;

/// All fields of one selection set that share a response key.
pub struct FieldGroup<'a> {
    key: &'a str,
    fields: Vec<&'a Field<'a, String>>,
}

impl<'a> FieldGroup<'a> {
    fn first(&self) -> &'a Field<'a, String> {
        self.fields[0]
    }

    /// The merged sub-selections of every field in the group.
    fn sub_selections(&self) -> Vec<&'a [Selection<'a, String>]> {
        self.fields.iter().map(|field| field.selection_set.items.as_slice()).collect()
    }
}

/// State shared by every resolver of one execution.
pub struct ExecutionContext<'a> {
    pub schema: &'a Schema,
    pub fetchers: &'a FetcherRegistry,
    pub context: &'a RequestContext,
    pub loaders: &'a DataLoaderRegistry,
    pub variables: &'a Map<String, Value>,
    pub fragments: HashMap<&'a str, &'a FragmentDefinition<'a, String>>,
    errors: Mutex<Vec<GraphQLError>>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        schema: &'a Schema,
        fetchers: &'a FetcherRegistry,
        context: &'a RequestContext,
        loaders: &'a DataLoaderRegistry,
        variables: &'a Map<String, Value>,
        fragments: HashMap<&'a str, &'a FragmentDefinition<'a, String>>,
    ) -> Self {
        Self { schema, fetchers, context, loaders, variables, fragments, errors: Mutex::new(Vec::new()) }
    }

    pub fn record(&self, error: GraphQLError) {
        tracing::debug!(message = %error.message, path = ?error.path, "field error");
        self.errors.lock().unwrap_or_else(PoisonError::into_inner).push(error);
    }

    pub fn take_errors(&self) -> Vec<GraphQLError> {
        std::mem::take(&mut *self.errors.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn collect_fields(&self, type_name: &str, selections: &[&'a [Selection<'a, String>]]) -> Vec<FieldGroup<'a>> {
        let mut groups = Vec::new();
        let mut visited = HashSet::new();
        for selection_set in selections {
            self.collect_into(type_name, selection_set, &mut groups, &mut visited);
        }
        groups
    }

    fn collect_into(
        &self,
        type_name: &str,
        selections: &'a [Selection<'a, String>],
        groups: &mut Vec<FieldGroup<'a>>,
        visited: &mut HashSet<&'a str>,
    ) {
        for selection in selections {
            match selection {
                Selection::Field(field) => {
                    if !utils::is_included(&field.directives, self.variables) {
                        continue;
                    }
                    let key = utils::response_key(field);
                    match groups.iter_mut().find(|group| group.key == key) {
                        Some(group) => group.fields.push(field),
                        None => groups.push(FieldGroup { key, fields: vec![field] }),
                    }
                }
                Selection::FragmentSpread(spread) => {
                    if !utils::is_included(&spread.directives, self.variables)
                        || !visited.insert(spread.fragment_name.as_str())
                    {
                        continue;
                    }
                    let Some(&fragment) = self.fragments.get(spread.fragment_name.as_str()) else {
                        self.record(
                            GraphQLError::new(format!("Unknown fragment '{}'", spread.fragment_name))
                                .with_classification(ErrorClassification::ValidationError),
                        );
                        continue;
                    };
                    let TypeCondition::On(condition) = &fragment.type_condition;
                    if self.schema.type_applies(type_name, condition) {
                        self.collect_into(type_name, &fragment.selection_set.items, groups, visited);
                    }
                }
                Selection::InlineFragment(inline) => {
                    if !utils::is_included(&inline.directives, self.variables) {
                        continue;
                    }
                    let applies = match &inline.type_condition {
                        Some(TypeCondition::On(condition)) => self.schema.type_applies(type_name, condition),
                        None => true,
                    };
                    if applies {
                        self.collect_into(type_name, &inline.selection_set.items, groups, visited);
                    }
                }
            }
        }
    }
}

fn child_path(path: &[PathSegment], segment: PathSegment) -> Vec<PathSegment> {
    let mut child = Vec::with_capacity(path.len() + 1);
    child.extend_from_slice(path);
    child.push(segment);
    child
}

/// Resolve a selection set against `source`, an object of type `type_name`.
///
/// Fields are resolved concurrently unless `serial` is set (mutation roots). Concurrent
/// resolution is what lets loads issued by sibling fields share a batch.
pub fn resolve_selection_set<'a>(
    ctx: &'a ExecutionContext<'a>,
    type_name: &'a str,
    source: Value,
    selections: Vec<&'a [Selection<'a, String>]>,
    path: Vec<PathSegment>,
    serial: bool,
) -> BoxFuture<'a, Completion> {
    async move {
        let groups = ctx.collect_fields(type_name, &selections);
        let results = if serial {
            let mut results = Vec::with_capacity(groups.len());
            for group in &groups {
                let field_path = child_path(&path, PathSegment::Field(group.key.to_owned()));
                results.push(resolve_field(ctx, type_name, &source, group, field_path).await);
            }
            results
        } else {
            join_all(groups.iter().map(|group| {
                let field_path = child_path(&path, PathSegment::Field(group.key.to_owned()));
                resolve_field(ctx, type_name, &source, group, field_path)
            }))
            .await
        };

        let mut data = Map::new();
        let mut bubbled = false;
        for (group, result) in groups.iter().zip(results) {
            match result {
                Ok(value) => {
                    data.insert(group.key.to_owned(), value);
                }
                Err(NullBubble) => bubbled = true,
            }
        }
        if bubbled {
            Err(NullBubble)
        } else {
            Ok(Value::Object(data))
        }
    }
    .boxed()
}

async fn resolve_field<'a>(
    ctx: &'a ExecutionContext<'a>,
    type_name: &'a str,
    source: &Value,
    group: &FieldGroup<'a>,
    path: Vec<PathSegment>,
) -> Completion {
    let field = group.first();
    if field.name == "__typename" {
        return Ok(Value::String(type_name.to_owned()));
    }
    let Some(def) = ctx.schema.field(type_name, &field.name) else {
        ctx.record(
            GraphQLError::new(format!("Field '{}' is not defined on type '{}'", field.name, type_name))
                .with_path(path)
                .with_classification(ErrorClassification::ValidationError),
        );
        return Ok(Value::Null);
    };

    let fetched = match ctx.fetchers.get(type_name, &field.name) {
        Some(fetcher) => {
            let env = DataFetchingEnvironment {
                parent_type: type_name,
                field_name: &field.name,
                source,
                arguments: utils::coerce_arguments(field, def, ctx.variables),
                context: ctx.context,
                loaders: ctx.loaders,
            };
            fetcher.fetch(&env).await
        }
        // Default property fetcher.
        None => Ok(source.get(&field.name).cloned().unwrap_or(Value::Null)),
    };

    match fetched {
        Ok(value) => complete_value(ctx, &def.ty, value, group, path).await,
        Err(e) => {
            tracing::debug!(parent_type = type_name, field = %field.name, error = %e, "fetcher failed");
            ctx.record(
                GraphQLError::new(e.to_string())
                    .with_path(path)
                    .with_classification(ErrorClassification::DataFetchingException),
            );
            if def.ty.is_non_null() {
                Err(NullBubble)
            } else {
                Ok(Value::Null)
            }
        }
    }
}

/// Complete a fetched value against its schema type.
///
/// Nullable positions absorb a [`NullBubble`] from below; non-null positions pass it upwards.
fn complete_value<'a, 'b>(
    ctx: &'a ExecutionContext<'a>,
    ty: &'a TypeRef,
    value: Value,
    group: &'b FieldGroup<'a>,
    path: Vec<PathSegment>,
) -> BoxFuture<'b, Completion>
where
    'a: 'b,
{
    async move {
        match ty {
            TypeRef::NonNull(inner) => {
                let completed = complete_nullable(ctx, inner, value, group, path.clone()).await?;
                if completed.is_null() {
                    ctx.record(
                        GraphQLError::new(format!(
                            "Cannot return null for non-nullable field '{}' of type '{}'",
                            group.key, ty
                        ))
                        .with_path(path)
                        .with_classification(ErrorClassification::DataFetchingException),
                    );
                    return Err(NullBubble);
                }
                Ok(completed)
            }
            _ => Ok(complete_nullable(ctx, ty, value, group, path).await.unwrap_or(Value::Null)),
        }
    }
    .boxed()
}

async fn complete_nullable<'a>(
    ctx: &'a ExecutionContext<'a>,
    ty: &'a TypeRef,
    value: Value,
    group: &FieldGroup<'a>,
    path: Vec<PathSegment>,
) -> Completion {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match ty {
        TypeRef::NonNull(_) => complete_value(ctx, ty, value, group, path).await,
        TypeRef::List(item_ty) => {
            let items = match value {
                Value::Array(items) => items,
                single => vec![single],
            };
            let completed = join_all(items.into_iter().enumerate().map(|(i, item)| {
                complete_value(ctx, item_ty, item, group, child_path(&path, PathSegment::Index(i)))
            }))
            .await;
            completed.into_iter().collect::<Result<Vec<_>, _>>().map(Value::Array)
        }
        TypeRef::Named(name) if ctx.schema.is_composite(name) => {
            let Some(concrete) = concrete_type(ctx, name, &value) else {
                ctx.record(
                    GraphQLError::new(format!(
                        "Could not determine the concrete type of '{}' for field '{}'",
                        name, group.key
                    ))
                    .with_path(path)
                    .with_classification(ErrorClassification::DataFetchingException),
                );
                return Err(NullBubble);
            };
            if !value.is_object() {
                ctx.record(
                    GraphQLError::new(format!("Expected an object of type '{}' for field '{}'", concrete, group.key))
                        .with_path(path)
                        .with_classification(ErrorClassification::DataFetchingException),
                );
                return Err(NullBubble);
            }
            resolve_selection_set(ctx, concrete, value, group.sub_selections(), path, false).await
        }
        TypeRef::Named(_) => Ok(value),
    }
}

/// The object type a value of the declared type `name` resolves to.
///
/// Values of interface and union types name their concrete type with a `__typename` key.
fn concrete_type<'a>(ctx: &ExecutionContext<'a>, name: &'a str, value: &Value) -> Option<&'a str> {
    if !ctx.schema.is_abstract(name) {
        return Some(name);
    }
    let type_name = value.get("__typename")?.as_str()?;
    let def = ctx.schema.get_type(type_name)?;
    ctx.schema.type_applies(&def.name, name).then_some(def.name.as_str())
}
