//! Utility functions for GraphQL execution

use graphql_parser::query::{Directive, Field, Value as GqlValue, VariableDefinition};
use serde_json::{json, Map, Value};

use crate::schema::FieldDef;

/// Convert a GraphQL value to JSON, substituting variables.
///
/// Variables that were not provided become `null`.
pub fn value_to_json(value: &GqlValue<'_, String>, variables: &Map<String, Value>) -> Value {
    match value {
        GqlValue::Null => Value::Null,
        GqlValue::Int(i) => i.as_i64().map(Value::from).unwrap_or(Value::Null),
        GqlValue::Float(f) => json!(f),
        GqlValue::String(s) => json!(s),
        GqlValue::Boolean(b) => json!(b),
        GqlValue::Enum(e) => json!(e),
        GqlValue::List(list) => Value::Array(list.iter().map(|v| value_to_json(v, variables)).collect()),
        GqlValue::Object(obj) => Value::Object(
            obj.iter().map(|(k, v)| (k.clone(), value_to_json(v, variables))).collect(),
        ),
        GqlValue::Variable(name) => variables.get(name).cloned().unwrap_or(Value::Null),
    }
}

/// Convert a value that cannot reference variables, such as a schema default.
pub fn const_value_to_json(value: &GqlValue<'_, String>) -> Value {
    value_to_json(value, &Map::new())
}

/// Merge the provided variables with the defaults declared by the operation.
pub fn with_variable_defaults(
    definitions: &[VariableDefinition<'_, String>],
    mut provided: Map<String, Value>,
) -> Map<String, Value> {
    for definition in definitions {
        if let Some(default) = &definition.default_value {
            if !provided.contains_key(&definition.name) {
                provided.insert(definition.name.clone(), const_value_to_json(default));
            }
        }
    }
    provided
}

/// Build the argument map of a field: literal and variable arguments, then schema defaults.
///
/// An argument bound to a variable that was not provided counts as absent, so the schema default
/// (if any) applies.
pub fn coerce_arguments(
    field: &Field<'_, String>,
    def: &FieldDef,
    variables: &Map<String, Value>,
) -> Map<String, Value> {
    let mut arguments = Map::new();
    for (name, value) in &field.arguments {
        if let GqlValue::Variable(variable) = value {
            if !variables.contains_key(variable) {
                continue;
            }
        }
        arguments.insert(name.clone(), value_to_json(value, variables));
    }
    for arg in &def.arguments {
        if arguments.contains_key(&arg.name) {
            continue;
        }
        if let Some(default) = &arg.default_value {
            arguments.insert(arg.name.clone(), default.clone());
        }
    }
    arguments
}

/// Evaluate `@skip(if:)` and `@include(if:)`.
pub fn is_included(directives: &[Directive<'_, String>], variables: &Map<String, Value>) -> bool {
    let condition = |directive: &Directive<'_, String>| {
        directive
            .arguments
            .iter()
            .find(|(name, _)| name == "if")
            .map(|(_, value)| value_to_json(value, variables).as_bool().unwrap_or(false))
            .unwrap_or(false)
    };
    directives.iter().all(|directive| match directive.name.as_str() {
        "skip" => !condition(directive),
        "include" => condition(directive),
        _ => true,
    })
}

/// The key a field's value is stored under in the response.
pub fn response_key<'a>(field: &'a Field<'_, String>) -> &'a str {
    field.alias.as_deref().unwrap_or(&field.name)
}
