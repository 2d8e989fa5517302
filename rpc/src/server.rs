//! Server handle: owns the ECA child process and its JSON-RPC session.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use eca_types::RewriteEvent;

use crate::codec::{Incoming, MessageReader, MessageWriter};
use crate::protocol::{
    self, Notification, Request, RewriteContentParams, RewritePromptParams, method,
};
use crate::types::{ServerConfig, ServerEvent, ServerStopReason};

const INIT_TIMEOUT_SECS: u64 = 60;

const SHUTDOWN_TIMEOUT_SECS: u64 = 2;

const WRITER_CHANNEL_CAPACITY: usize = 64;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

enum WriterCommand {
    Send(Value),
    Shutdown,
}

/// A running ECA server.
///
/// Events are delivered on the sender handed to [`EcaServer::start`], converted
/// into the caller's own input type so the server can feed an event loop directly.
pub struct EcaServer<E> {
    child: Child,
    writer_tx: mpsc::Sender<WriterCommand>,
    event_tx: mpsc::Sender<E>,
    next_id: u64,
    pending: PendingMap,
    /// Cleared by the reader task when stdout closes or breaks.
    alive: Arc<AtomicBool>,
    #[allow(dead_code)]
    reader_handle: JoinHandle<()>,
    #[allow(dead_code)]
    writer_handle: JoinHandle<()>,
}

impl<E> EcaServer<E>
where
    E: From<ServerEvent> + Send + 'static,
{
    /// Spawn the server and complete the `initialize` handshake.
    pub async fn start(
        config: &ServerConfig,
        workspace_root: &Path,
        event_tx: mpsc::Sender<E>,
    ) -> Result<Self> {
        let resolved = which::which(&config.command)
            .with_context(|| format!("{} not found in PATH", config.command))?;
        let mut child = Command::new(&resolved)
            .args(&config.args)
            .current_dir(workspace_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning {}", config.command))?;

        let stdout = child.stdout.take().context("no stdout from child")?;
        let stdin = child.stdin.take().context("no stdin from child")?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));

        let (writer_tx, mut writer_rx) = mpsc::channel::<WriterCommand>(WRITER_CHANNEL_CAPACITY);
        let writer_handle = tokio::spawn(async move {
            let mut writer = MessageWriter::new(stdin);
            while let Some(cmd) = writer_rx.recv().await {
                match cmd {
                    WriterCommand::Send(message) => {
                        if let Err(e) = writer.send(&message).await {
                            tracing::warn!("ECA write error: {e:#}");
                            break;
                        }
                    }
                    WriterCommand::Shutdown => break,
                }
            }
        });

        let reader_pending = pending.clone();
        let reader_alive = alive.clone();
        let reader_event_tx = event_tx.clone();
        let reader_writer_tx = writer_tx.clone();
        let reader_handle = tokio::spawn(async move {
            let mut reader = MessageReader::new(stdout);
            let reason = loop {
                match reader.next_message().await {
                    Ok(Some(body)) => {
                        Self::dispatch(body, &reader_pending, &reader_event_tx, &reader_writer_tx)
                            .await;
                    }
                    Ok(None) => {
                        tracing::info!("ECA server closed stdout");
                        break ServerStopReason::Exited;
                    }
                    Err(e) => {
                        tracing::warn!("ECA reader error: {e:#}");
                        break ServerStopReason::Failed(e.to_string());
                    }
                }
            };
            reader_alive.store(false, Ordering::SeqCst);
            // Dropping the senders fails every in-flight request.
            reader_pending.lock().await.clear();
            let _ = reader_event_tx
                .send(E::from(ServerEvent::ServerStopped { reason }))
                .await;
        });

        let mut server = Self {
            child,
            writer_tx,
            event_tx,
            next_id: 1,
            pending,
            alive,
            reader_handle,
            writer_handle,
        };

        server.initialize(workspace_root).await?;

        Ok(server)
    }

    async fn dispatch(
        body: Value,
        pending: &Mutex<HashMap<u64, oneshot::Sender<Value>>>,
        event_tx: &mpsc::Sender<E>,
        writer_tx: &mpsc::Sender<WriterCommand>,
    ) {
        let Some(incoming) = Incoming::classify(body) else {
            tracing::trace!("Ignoring malformed JSON-RPC message from ECA");
            return;
        };

        match incoming {
            Incoming::Response { id, body } => {
                let sender = pending.lock().await.remove(&id);
                if let Some(tx) = sender {
                    let _ = tx.send(body);
                }
            }
            Incoming::Request { id, method } => {
                tracing::debug!("ECA sent request: {method}, replying method not found");
                let reply = protocol::method_not_found(id, &method);
                let _ = writer_tx.send(WriterCommand::Send(reply)).await;
            }
            Incoming::Notification { method, params } => {
                Self::handle_notification(&method, params, event_tx).await;
            }
        }
    }

    async fn handle_notification(name: &str, params: Option<Value>, event_tx: &mpsc::Sender<E>) {
        match name {
            method::REWRITE_CONTENT_RECEIVED => {
                let Some(params) = params else { return };
                match serde_json::from_value::<RewriteContentParams>(params) {
                    Ok(params) => {
                        let event = ServerEvent::Rewrite {
                            rewrite_id: params.rewrite_id,
                            event: params.content.into(),
                        };
                        let _ = event_tx.send(E::from(event)).await;
                    }
                    Err(e) => {
                        tracing::debug!("Dropping malformed rewrite/contentReceived: {e}");
                    }
                }
            }
            _ => {
                tracing::trace!("Ignoring ECA notification: {name}");
            }
        }
    }

    async fn initialize(&mut self, workspace_root: &Path) -> Result<()> {
        let root_uri = protocol::path_to_file_uri(workspace_root)
            .context("converting workspace root to URI")?;
        let name = workspace_root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("workspace");

        let params = protocol::initialize_params(root_uri.as_str(), name);
        let response = self.request(method::INITIALIZE, Some(params)).await?;
        if let Some(message) = protocol::response_error(&response) {
            bail!("ECA initialize failed: {message}");
        }

        self.notify(method::INITIALIZED, Some(serde_json::json!({})))
            .await
    }

    /// Queue a request and return the receiver its response will arrive on.
    async fn enqueue_request(
        &mut self,
        method: &'static str,
        params: Option<Value>,
    ) -> Result<oneshot::Receiver<Value>> {
        let id = self.next_id;
        self.next_id += 1;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let frame = serde_json::to_value(Request::new(id, method, params))
            .context("serializing request")?;
        if self
            .writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .is_err()
        {
            self.pending.lock().await.remove(&id);
            bail!("writer channel closed");
        }
        Ok(rx)
    }

    async fn request(&mut self, method: &'static str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id;
        let rx = self.enqueue_request(method, params).await?;

        match tokio::time::timeout(Duration::from_secs(INIT_TIMEOUT_SECS), rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => {
                self.pending.lock().await.remove(&id);
                bail!("response channel dropped");
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                bail!("{method} timed out");
            }
        }
    }

    async fn notify(&self, method: &'static str, params: Option<Value>) -> Result<()> {
        let frame = serde_json::to_value(Notification::new(method, params))
            .context("serializing notification")?;
        self.writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .map_err(|_| anyhow::anyhow!("writer channel closed"))
    }

    /// Whether the server is still reading our messages.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Send `rewrite/prompt` without waiting for the answer.
    ///
    /// Returns once the request is queued. If the server later rejects it, or
    /// the connection drops first, a [`RewriteEvent::Failed`] for the session
    /// arrives on the event channel.
    pub async fn send_rewrite_prompt(&mut self, params: RewritePromptParams) -> Result<()> {
        if !self.is_connected() {
            bail!("ECA server is not running");
        }
        let rewrite_id = params.id;
        let body = serde_json::to_value(&params).context("serializing rewrite/prompt params")?;
        let response = self
            .enqueue_request(method::REWRITE_PROMPT, Some(body))
            .await?;

        let events = self.event_tx.clone();
        tokio::spawn(async move {
            let failure = match response.await {
                Ok(body) => protocol::response_error(&body),
                Err(_) => Some(String::from("connection closed before the server answered")),
            };
            if let Some(message) = failure {
                tracing::warn!(rewrite_id = %rewrite_id, "rewrite/prompt failed: {message}");
                let event = ServerEvent::Rewrite {
                    rewrite_id,
                    event: RewriteEvent::Failed { message },
                };
                let _ = events.send(E::from(event)).await;
            }
        });
        Ok(())
    }

    /// Gracefully shut down the server. Consumes self.
    pub async fn shutdown(mut self) {
        if self.is_connected()
            && let Ok(response) = self.request(method::SHUTDOWN, None).await
            && response.get("error").is_none()
        {
            let _ = self.notify(method::EXIT, None).await;
        }

        let _ = self.writer_tx.send(WriterCommand::Shutdown).await;

        let exited = tokio::time::timeout(
            Duration::from_secs(SHUTDOWN_TIMEOUT_SECS),
            self.child.wait(),
        )
        .await;

        if exited.is_err() {
            tracing::debug!("ECA server didn't exit in time, killing");
            let _ = self.child.kill().await;
        }
    }
}
