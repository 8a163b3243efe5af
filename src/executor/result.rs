use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::json_path;
use crate::error::ExtractionError;

/// One step of a response path: a field's response key or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

/// How an error came about, reported under `extensions.classification`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClassification {
    InvalidSyntax,
    ValidationError,
    DataFetchingException,
    ExecutionAborted,
}

/// A GraphQL error as it appears in the `errors` list of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathSegment>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
}

impl GraphQLError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), path: Vec::new(), extensions: Map::new() }
    }

    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = path;
        self
    }

    pub fn with_classification(mut self, classification: ErrorClassification) -> Self {
        let value = serde_json::to_value(classification).unwrap_or(Value::Null);
        self.extensions.insert("classification".to_owned(), value);
        self
    }

    pub fn classification(&self) -> Option<ErrorClassification> {
        self.extensions
            .get("classification")
            .and_then(|value| ErrorClassification::deserialize(value).ok())
    }
}

/// The outcome of one execution.
///
/// `data` is `None` when the execution never reached field resolution (syntax errors, unknown
/// operation, failed context builder) and `Some(Value::Null)` when a fatal error or a null in a
/// non-null root field discarded the result tree.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,
}

impl ExecutionResult {
    pub(crate) fn failed(error: GraphQLError) -> Self {
        Self { data: None, errors: vec![error] }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Applies a JSON path such as `data.hello` or `$.data.names[0]` to the serialized result.
    pub fn extract_json_path<T: DeserializeOwned>(&self, path: &str) -> Result<T, ExtractionError> {
        json_path::extract(&self.to_json(), path)
    }
}
