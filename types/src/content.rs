//! The rewrite event vocabulary.

use serde::{Deserialize, Serialize};

/// Wire shape of the `content` field of a `rewrite/contentReceived` notification.
///
/// Unknown `type` tags fail to deserialize; the transport drops them at the
/// boundary so they never reach the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RewriteContent {
    Reasoning {
        #[serde(default)]
        text: String,
    },
    Started,
    Text {
        text: String,
    },
    Finished,
}

/// Everything that can happen to a session from the backend's side.
///
/// `Failed` has no wire counterpart in `rewrite/contentReceived`: it is how the
/// transport reports that the `rewrite/prompt` request itself was rejected or lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteEvent {
    Reasoning { text: String },
    Started,
    Text { text: String },
    Finished,
    Failed { message: String },
}

impl RewriteEvent {
    /// Short name used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Reasoning { .. } => "reasoning",
            Self::Started => "started",
            Self::Text { .. } => "text",
            Self::Finished => "finished",
            Self::Failed { .. } => "failed",
        }
    }
}

impl From<RewriteContent> for RewriteEvent {
    fn from(content: RewriteContent) -> Self {
        match content {
            RewriteContent::Reasoning { text } => Self::Reasoning { text },
            RewriteContent::Started => Self::Started,
            RewriteContent::Text { text } => Self::Text { text },
            RewriteContent::Finished => Self::Finished,
        }
    }
}
