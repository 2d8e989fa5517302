//! The backend seam: where prompts go.

use std::future::Future;

use eca_rpc::{EcaServer, RewritePromptParams, ServerEvent};

use crate::error::BackendError;

/// Something that can generate a rewrite.
///
/// `send_prompt` returns once the request is on its way. Everything the
/// backend produces afterwards, including a late failure, comes back as
/// events on the driver's input channel.
pub trait RewriteBackend {
    fn is_connected(&self) -> bool;

    fn send_prompt(
        &mut self,
        params: RewritePromptParams,
    ) -> impl Future<Output = Result<(), BackendError>>;
}

impl<E> RewriteBackend for EcaServer<E>
where
    E: From<ServerEvent> + Send + 'static,
{
    fn is_connected(&self) -> bool {
        EcaServer::is_connected(self)
    }

    async fn send_prompt(&mut self, params: RewritePromptParams) -> Result<(), BackendError> {
        self.send_rewrite_prompt(params)
            .await
            .map_err(|e| BackendError::new(format!("{e:#}")))
    }
}

/// A backend that records prompts instead of sending them.
///
/// Content is fed to the manager directly, so hosts can exercise the whole
/// engine without a server.
#[derive(Debug)]
pub struct RecordingBackend {
    connected: bool,
    refuse_next: Option<String>,
    prompts: Vec<RewritePromptParams>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self {
            connected: true,
            refuse_next: None,
            prompts: Vec::new(),
        }
    }
}

impl RecordingBackend {
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Fail the next `send_prompt` with `message`.
    pub fn refuse_next(&mut self, message: impl Into<String>) {
        self.refuse_next = Some(message.into());
    }

    #[must_use]
    pub fn prompts(&self) -> &[RewritePromptParams] {
        &self.prompts
    }
}

impl RewriteBackend for RecordingBackend {
    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn send_prompt(&mut self, params: RewritePromptParams) -> Result<(), BackendError> {
        if let Some(message) = self.refuse_next.take() {
            return Err(BackendError::new(message));
        }
        self.prompts.push(params);
        Ok(())
    }
}
