//! JSONPath extraction from result trees.
//!
//! Paths follow the usual JSONPath syntax (`$.data.names[0]`, `$..stars`, `$.data.names[*]`); a
//! path without a leading `$` is read relative to the root, so `data.hello` works as well.
//!
//! A definite path (one that names a single location) is deserialized from the value it selects.
//! An indefinite path (wildcards, recursive descent, filters, unions and slices) is deserialized
//! from the list of everything it selects, in document order.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ExtractionError;

pub fn extract<T: DeserializeOwned>(value: &Value, path: &str) -> Result<T, ExtractionError> {
    let expression = normalize(path);
    let selected = jsonpath_lib::select(value, &expression).map_err(|e| ExtractionError::InvalidPath {
        path: path.to_owned(),
        message: format!("{:?}", e),
    })?;
    if selected.is_empty() {
        return Err(ExtractionError::PathNotFound { path: path.to_owned() });
    }

    let found = if is_definite(&expression) && selected.len() == 1 {
        selected[0].clone()
    } else {
        Value::Array(selected.into_iter().cloned().collect())
    };
    serde_json::from_value(found)
        .map_err(|source| ExtractionError::TypeMismatch { path: path.to_owned(), source })
}

fn normalize(path: &str) -> String {
    let path = path.trim();
    if path.starts_with('$') {
        path.to_owned()
    } else if path.starts_with('[') {
        format!("${}", path)
    } else {
        format!("$.{}", path)
    }
}

/// Whether `path` can select at most one value.
fn is_definite(path: &str) -> bool {
    if path.contains("..") || path.contains('*') || path.contains("[?") {
        return false;
    }
    // `[0,1]` and `[1:3]` select several elements; quoted keys are names, not selectors.
    path.split('[').skip(1).all(|selector| {
        let selector = selector.split(']').next().unwrap_or_default().trim();
        selector.starts_with('\'')
            || selector.starts_with('"')
            || !(selector.contains(',') || selector.contains(':'))
    })
}
