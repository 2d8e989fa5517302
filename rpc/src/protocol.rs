//! Message shapes exchanged with the ECA server.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use eca_types::{Position, RewriteContent, RewriteId};

pub(crate) mod method {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "initialized";
    pub const SHUTDOWN: &str = "shutdown";
    pub const EXIT: &str = "exit";
    pub const REWRITE_PROMPT: &str = "rewrite/prompt";
    pub const REWRITE_CONTENT_RECEIVED: &str = "rewrite/contentReceived";
}

/// JSON-RPC "method not found".
pub(crate) const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, thiserror::Error)]
#[error("cannot convert path to file URI: {}", path.display())]
pub struct PathToUriError {
    path: PathBuf,
}

#[derive(Debug, Serialize)]
pub(crate) struct Request {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(id: u64, method: &'static str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Notification {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    pub fn new(method: &'static str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
        }
    }
}

pub(crate) fn method_not_found(id: Value, method: &str) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": METHOD_NOT_FOUND,
            "message": format!("Method not found: {method}")
        }
    })
}

/// Human-readable message of an error response, or `None` for a success.
pub(crate) fn response_error(response: &Value) -> Option<String> {
    let error = response.get("error")?;
    Some(
        error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string(),
    )
}

pub(crate) fn initialize_params(workspace_uri: &str, workspace_name: &str) -> Value {
    serde_json::json!({
        "processId": std::process::id(),
        "clientInfo": {
            "name": "eca-rewrite",
            "version": env!("CARGO_PKG_VERSION")
        },
        "capabilities": {
            "codeAssistant": {
                "rewrite": true
            }
        },
        "initializationOptions": {},
        "workspaceFolders": [{
            "uri": workspace_uri,
            "name": workspace_name
        }]
    })
}

/// A position as the server expects it: 1-based line, 0-based character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WirePosition {
    pub line: u32,
    pub character: u32,
}

impl From<Position> for WirePosition {
    fn from(position: Position) -> Self {
        Self {
            line: position.line + 1,
            character: position.character,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRange {
    pub start: WirePosition,
    pub end: WirePosition,
}

impl WireRange {
    #[must_use]
    pub fn new(start: Position, end: Position) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

/// Params of the `rewrite/prompt` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewritePromptParams {
    pub id: RewriteId,
    /// The selected text being rewritten.
    pub text: String,
    pub prompt: String,
    /// Filesystem path of the document.
    pub path: String,
    pub range: WireRange,
}

/// Params of the `rewrite/contentReceived` notification.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RewriteContentParams {
    pub rewrite_id: RewriteId,
    pub content: RewriteContent,
}

pub fn path_to_file_uri(path: &Path) -> Result<url::Url, PathToUriError> {
    url::Url::from_file_path(path).map_err(|()| PathToUriError {
        path: path.to_path_buf(),
    })
}
