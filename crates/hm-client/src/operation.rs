//! GraphQL operation descriptors and response envelopes

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ClientError, Result};

/// Error code the backend puts in `extensions.code` for an expired credential
pub const UNAUTHENTICATED_CODE: &str = "UNAUTHENTICATED";

/// Kind of a GraphQL operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    /// Derive the kind from the main definition of a GraphQL document.
    ///
    /// The first operation keyword wins; a document starting with `{` is a
    /// shorthand query. Fragment definitions and comments are skipped.
    pub fn from_document(document: &str) -> Result<Self> {
        let mut rest = document;
        loop {
            rest = rest.trim_start();
            if rest.is_empty() {
                return Err(ClientError::InvalidOperation(
                    "document contains no operation".to_string(),
                ));
            }
            if rest.starts_with('#') {
                rest = rest.split_once('\n').map(|(_, tail)| tail).unwrap_or("");
                continue;
            }
            if rest.starts_with('{') {
                return Ok(OperationKind::Query);
            }

            let word_end = rest
                .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            let (word, tail) = rest.split_at(word_end);
            match word {
                "query" => return Ok(OperationKind::Query),
                "mutation" => return Ok(OperationKind::Mutation),
                "subscription" => return Ok(OperationKind::Subscription),
                "fragment" => rest = skip_block(tail),
                other => {
                    return Err(ClientError::InvalidOperation(format!(
                        "unexpected token '{}'",
                        other
                    )))
                }
            }
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Query => write!(f, "query"),
            OperationKind::Mutation => write!(f, "mutation"),
            OperationKind::Subscription => write!(f, "subscription"),
        }
    }
}

/// Skip past the first balanced `{ ... }` block
fn skip_block(input: &str) -> &str {
    let mut depth = 0usize;
    for (idx, c) in input.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return &input[idx + 1..];
                }
            }
            _ => {}
        }
    }
    ""
}

/// An outbound GraphQL operation
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub document: String,
    pub operation_name: Option<String>,
    pub variables: Value,
}

impl Operation {
    /// Build an operation whose kind is read from the document
    pub fn parse(document: impl Into<String>) -> Result<Self> {
        let document = document.into();
        let kind = OperationKind::from_document(&document)?;
        Ok(Self {
            kind,
            document,
            operation_name: None,
            variables: Value::Null,
        })
    }

    pub fn query(document: impl Into<String>) -> Self {
        Self::with_kind(OperationKind::Query, document)
    }

    pub fn mutation(document: impl Into<String>) -> Self {
        Self::with_kind(OperationKind::Mutation, document)
    }

    pub fn subscription(document: impl Into<String>) -> Self {
        Self::with_kind(OperationKind::Subscription, document)
    }

    fn with_kind(kind: OperationKind, document: impl Into<String>) -> Self {
        Self {
            kind,
            document: document.into(),
            operation_name: None,
            variables: Value::Null,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = variables;
        self
    }

    /// Wire payload shared by the HTTP body and the `subscribe` message
    pub fn payload(&self) -> RequestPayload<'_> {
        RequestPayload {
            query: &self.document,
            operation_name: self.operation_name.as_deref(),
            variables: if self.variables.is_null() {
                None
            } else {
                Some(&self.variables)
            },
        }
    }
}

/// The `{query, operationName, variables}` request body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPayload<'a> {
    pub query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<&'a Value>,
}

/// A single entry of the GraphQL `errors` array
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GraphQlError {
    pub message: String,
    #[serde(default)]
    pub extensions: Option<Value>,
}

impl GraphQlError {
    pub fn code(&self) -> Option<&str> {
        self.extensions
            .as_ref()
            .and_then(|ext| ext.get("code"))
            .and_then(Value::as_str)
    }

    /// True when the error reports a missing or expired credential
    pub fn is_auth_expired(&self) -> bool {
        self.code() == Some(UNAUTHENTICATED_CODE) || self.message == "Unauthorized"
    }
}

/// The `{data, errors}` response envelope
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct GraphQlResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

impl GraphQlResponse {
    /// Turn the envelope into its data, mapping errors to [`ClientError`]
    pub fn into_result(self) -> Result<Value> {
        errors_to_result(&self.errors)?;
        Ok(self.data.unwrap_or(Value::Null))
    }
}

/// Map a GraphQL `errors` array to an error, or `Ok` when it is empty
pub fn errors_to_result(errors: &[GraphQlError]) -> Result<()> {
    if errors.is_empty() {
        return Ok(());
    }
    if errors.iter().any(GraphQlError::is_auth_expired) {
        return Err(ClientError::AuthExpired);
    }
    let message = errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ");
    Err(ClientError::GraphQl(message))
}
