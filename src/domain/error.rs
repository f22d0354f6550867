use std::fmt;

use serde::Serialize;
use thiserror::Error;

pub const INVALID_VALUE: &str = "Invalid value";

/// A single rejected input field, shaped for the `errors` array of a 400 reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub msg: &'static str,
    pub path: &'static str,
    pub location: &'static str,
}

impl FieldError {
    pub fn invalid(path: &'static str, value: Option<String>) -> Self {
        Self {
            kind: "field",
            value,
            msg: INVALID_VALUE,
            path,
            location: "body",
        }
    }
}

/// Every field that failed validation, in declaration order. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub(crate) fn from_vec(errors: Vec<FieldError>) -> Option<Self> {
        (!errors.is_empty()).then_some(Self { errors })
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn paths(&self) -> Vec<&'static str> {
        self.errors.iter().map(|error| error.path).collect()
    }

    pub fn into_errors(self) -> Vec<FieldError> {
        self.errors
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid fields: {}", self.paths().join(", "))
    }
}
