//! The event loop around a [`RewriteManager`].
//!
//! One task owns the manager and handles one input at a time: triggers,
//! backend events, document changes, and user commands all arrive on a single
//! channel, and the loop sleeps until the earliest pending flush in between.
//! Inputs win over timers, so a burst of streamed text is buffered before the
//! flush it armed gets to run.

use std::future;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};

use eca_rpc::ServerEvent;
use eca_types::{DocumentChange, RewriteId};

use crate::backend::RewriteBackend;
use crate::error::TriggerError;
use crate::manager::{RewriteManager, RewriteTrigger, SessionUpdate};
use crate::notice::Notice;
use crate::surface::Workspace;

pub type TriggerReply = oneshot::Sender<Result<RewriteId, TriggerError>>;

#[derive(Debug)]
pub enum RewriteInput {
    Trigger {
        trigger: RewriteTrigger,
        reply: Option<TriggerReply>,
    },
    Backend(ServerEvent),
    DocumentChanged(DocumentChange),
    Accept(RewriteId),
    Reject(RewriteId),
    Shutdown,
}

impl From<ServerEvent> for RewriteInput {
    fn from(event: ServerEvent) -> Self {
        Self::Backend(event)
    }
}

/// Something the host should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Notice(Notice),
    Session(SessionUpdate),
}

pub struct RewriteDriver<W, B> {
    manager: RewriteManager<W, B>,
    inputs: mpsc::Receiver<RewriteInput>,
    host: Option<mpsc::UnboundedSender<HostEvent>>,
}

impl<W: Workspace, B: RewriteBackend> RewriteDriver<W, B> {
    pub fn new(manager: RewriteManager<W, B>, inputs: mpsc::Receiver<RewriteInput>) -> Self {
        Self {
            manager,
            inputs,
            host: None,
        }
    }

    /// Forward notices and lifecycle changes to `host` as they happen.
    /// Without a host they stay queued on the manager.
    pub fn with_host(mut self, host: mpsc::UnboundedSender<HostEvent>) -> Self {
        self.host = Some(host);
        self
    }

    /// Run until [`RewriteInput::Shutdown`] or until every input sender is
    /// dropped, then hand the manager back.
    pub async fn run(mut self) -> RewriteManager<W, B> {
        loop {
            let deadline = self.manager.next_flush_due();
            tokio::select! {
                biased;

                input = self.inputs.recv() => match input {
                    None | Some(RewriteInput::Shutdown) => break,
                    Some(input) => self.handle(input).await,
                },
                () = sleep_until(deadline) => {
                    self.manager.flush_due(Instant::now()).await;
                }
            }
            self.publish();
        }

        tracing::debug!(
            active = self.manager.active_sessions(),
            "Rewrite driver stopped"
        );
        self.publish();
        self.manager
    }

    async fn handle(&mut self, input: RewriteInput) {
        match input {
            RewriteInput::Trigger { trigger, reply } => {
                let result = self.manager.create(trigger).await;
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            RewriteInput::Backend(ServerEvent::Rewrite { rewrite_id, event }) => {
                self.manager.dispatch_event(rewrite_id, event).await;
            }
            RewriteInput::Backend(ServerEvent::ServerStopped { reason }) => {
                self.manager.on_backend_stopped(&reason);
            }
            RewriteInput::DocumentChanged(change) => {
                self.manager.on_document_changed(&change);
            }
            RewriteInput::Accept(id) => {
                if let Err(err) = self.manager.accept(id).await {
                    tracing::debug!("Accept ignored: {err}");
                }
            }
            RewriteInput::Reject(id) => {
                if let Err(err) = self.manager.reject(id).await {
                    tracing::debug!("Reject ignored: {err}");
                }
            }
            RewriteInput::Shutdown => {}
        }
    }

    fn publish(&mut self) {
        let Some(host) = &self.host else {
            return;
        };
        let notices = self.manager.drain_notices().into_iter().map(HostEvent::Notice);
        let updates = self.manager.drain_updates().into_iter().map(HostEvent::Session);
        for event in notices.chain(updates) {
            if host.send(event).is_err() {
                tracing::debug!("Host stopped listening");
                self.host = None;
                return;
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use eca_types::text::TextRange;
    use eca_types::{DocumentUri, RewriteEvent};

    use super::*;
    use crate::backend::RecordingBackend;
    use crate::manager::RewriteSettings;
    use crate::memory::MemoryWorkspace;
    use crate::session::Lifecycle;
    use crate::surface::EditSurface;

    const URI: &str = "file:///work/main.rs";

    fn driver(
        text: &str,
    ) -> (
        RewriteDriver<MemoryWorkspace, RecordingBackend>,
        mpsc::Sender<RewriteInput>,
        mpsc::UnboundedReceiver<HostEvent>,
    ) {
        let (mut workspace, _changes) = MemoryWorkspace::new();
        workspace.open(DocumentUri::from(URI), text);
        let settings = RewriteSettings {
            flush_delay: Duration::from_millis(1),
            ..RewriteSettings::default()
        };
        let manager = RewriteManager::new(workspace, RecordingBackend::default(), settings);
        let (tx, rx) = mpsc::channel(64);
        let (host_tx, host_rx) = mpsc::unbounded_channel();
        (RewriteDriver::new(manager, rx).with_host(host_tx), tx, host_rx)
    }

    fn content(id: RewriteId, event: RewriteEvent) -> RewriteInput {
        RewriteInput::from(ServerEvent::Rewrite {
            rewrite_id: id,
            event,
        })
    }

    async fn wait_for(
        host: &mut mpsc::UnboundedReceiver<HostEvent>,
        id: RewriteId,
        lifecycle: Lifecycle,
    ) {
        while let Some(event) = host.recv().await {
            if event == HostEvent::Session(SessionUpdate { id, lifecycle }) {
                return;
            }
        }
        panic!("host channel closed before {lifecycle}");
    }

    #[tokio::test]
    async fn drives_a_rewrite_to_acceptance() {
        let (driver, tx, mut host) = driver("let v = foo(bar);\n");

        let script = async move {
            let (reply_tx, reply_rx) = oneshot::channel();
            tx.send(RewriteInput::Trigger {
                trigger: RewriteTrigger {
                    uri: DocumentUri::from(URI),
                    path: "/work/main.rs".to_string(),
                    selection: TextRange::new(8, 16),
                    prompt: "rename".to_string(),
                },
                reply: Some(reply_tx),
            })
            .await
            .unwrap();
            let id = reply_rx.await.unwrap().unwrap();

            tx.send(content(id, RewriteEvent::Started)).await.unwrap();
            for chunk in ["qux", "(bar", ")"] {
                tx.send(content(
                    id,
                    RewriteEvent::Text {
                        text: chunk.to_string(),
                    },
                ))
                .await
                .unwrap();
            }
            tx.send(content(id, RewriteEvent::Finished)).await.unwrap();
            wait_for(&mut host, id, Lifecycle::Finished).await;

            tx.send(RewriteInput::Accept(id)).await.unwrap();
            wait_for(&mut host, id, Lifecycle::Terminated).await;
            tx.send(RewriteInput::Shutdown).await.unwrap();
            id
        };

        let (manager, id) = tokio::join!(driver.run(), script);
        let doc = manager.workspace().document(&DocumentUri::from(URI)).unwrap();
        assert_eq!(doc.text(), "let v = qux(bar);\n");
        assert_eq!(manager.lifecycle(id), Lifecycle::Terminated);
        assert_eq!(manager.backend().prompts().len(), 1);
    }

    #[tokio::test]
    async fn timer_flushes_without_further_input() {
        let (driver, tx, mut host) = driver("a  b");

        let script = async move {
            let (reply_tx, reply_rx) = oneshot::channel();
            tx.send(RewriteInput::Trigger {
                trigger: RewriteTrigger {
                    uri: DocumentUri::from(URI),
                    path: "/work/main.rs".to_string(),
                    selection: TextRange::new(1, 3),
                    prompt: "fill".to_string(),
                },
                reply: Some(reply_tx),
            })
            .await
            .unwrap();
            let id = reply_rx.await.unwrap().unwrap();
            tx.send(content(id, RewriteEvent::Started)).await.unwrap();
            wait_for(&mut host, id, Lifecycle::Streaming).await;
            tx.send(content(
                id,
                RewriteEvent::Text {
                    text: "-x-".to_string(),
                },
            ))
            .await
            .unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            tx.send(RewriteInput::Shutdown).await.unwrap();
            id
        };

        let (manager, id) = tokio::join!(driver.run(), script);
        let doc = manager.workspace().document(&DocumentUri::from(URI)).unwrap();
        assert_eq!(doc.text(), "a-x-b");
        assert_eq!(manager.session(id).unwrap().applied_len(), 3);
        assert_eq!(manager.lifecycle(id), Lifecycle::Streaming);
    }

    #[tokio::test]
    async fn failed_trigger_is_replied_and_noticed() {
        let (driver, tx, mut host) = driver("abc");

        let script = async move {
            let (reply_tx, reply_rx) = oneshot::channel();
            tx.send(RewriteInput::Trigger {
                trigger: RewriteTrigger {
                    uri: DocumentUri::from(URI),
                    path: "/work/main.rs".to_string(),
                    selection: TextRange::at(1),
                    prompt: "x".to_string(),
                },
                reply: Some(reply_tx),
            })
            .await
            .unwrap();
            let result = reply_rx.await.unwrap();
            let notice = host.recv().await.unwrap();
            drop(tx);
            (result, notice)
        };

        let (manager, (result, notice)) = tokio::join!(driver.run(), script);
        assert_eq!(result, Err(TriggerError::EmptySelection));
        assert!(matches!(notice, HostEvent::Notice(_)));
        assert_eq!(manager.active_sessions(), 0);
    }
}
