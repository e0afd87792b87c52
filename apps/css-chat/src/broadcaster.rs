use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info};

use crate::connection::{Connection, ConnectionId};
use crate::draft::display_text;
use crate::message_log::SharedLog;
use crate::metrics;
use crate::registry::{ConnectionRegistry, FanoutReport};
use crate::render::escape_html;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Joined,
    Left,
    Chat,
}

impl MessageKind {
    pub fn label(self) -> &'static str {
        match self {
            MessageKind::Joined => "joined",
            MessageKind::Left => "left",
            MessageKind::Chat => "chat",
        }
    }
}

/// A rendered line waiting to be appended to the shared log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub origin: ConnectionId,
    pub kind: MessageKind,
    pub text: String,
}

impl PendingMessage {
    pub fn joined(connection: &Connection) -> Self {
        Self {
            origin: connection.id().clone(),
            kind: MessageKind::Joined,
            text: format!("{} joined the chat.", escape_html(connection.display_name())),
        }
    }

    pub fn left(connection: &Connection) -> Self {
        Self {
            origin: connection.id().clone(),
            kind: MessageKind::Left,
            text: format!("{} left the chat.", escape_html(connection.display_name())),
        }
    }

    /// `draft` is in path encoding.
    pub fn chat(connection: &Connection, draft: &str) -> Self {
        Self {
            origin: connection.id().clone(),
            kind: MessageKind::Chat,
            text: format!(
                "{}: {}",
                escape_html(connection.display_name()),
                display_text(draft)
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcaster has stopped")]
    Stopped,
}

#[derive(Clone)]
pub struct BroadcastHandle {
    tx: mpsc::UnboundedSender<PendingMessage>,
}

impl BroadcastHandle {
    /// Queues a message for the broadcaster. Never waits.
    pub fn publish(&self, message: PendingMessage) -> Result<(), BroadcastError> {
        self.tx.send(message).map_err(|_| BroadcastError::Stopped)
    }
}

/// Single writer of the message log; wakes every session after each append.
pub struct Broadcaster {
    rx: mpsc::UnboundedReceiver<PendingMessage>,
    log: SharedLog,
    registry: ConnectionRegistry,
}

impl Broadcaster {
    pub fn new(log: SharedLog, registry: ConnectionRegistry) -> (Self, BroadcastHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx, log, registry }, BroadcastHandle { tx })
    }

    pub fn spawn(log: SharedLog, registry: ConnectionRegistry) -> (BroadcastHandle, JoinHandle<()>) {
        let (broadcaster, handle) = Self::new(log, registry);
        (handle, tokio::spawn(broadcaster.run()))
    }

    /// Runs until every [`BroadcastHandle`] is dropped.
    pub async fn run(mut self) {
        while let Some(message) = self.rx.recv().await {
            self.deliver(message);
        }
        info!("broadcaster stopped; no publishers remain");
    }

    fn deliver(&self, message: PendingMessage) -> FanoutReport {
        let evicted = self.log.write().push(message.text);
        metrics::record_published(message.kind.label(), evicted);

        let report = self.registry.notify_all();
        metrics::record_fanout(&report);
        debug!(
            origin = %message.origin,
            kind = message.kind.label(),
            evicted,
            delivered = report.delivered,
            coalesced = report.coalesced,
            closed = report.closed,
            "message broadcast"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Wake;
    use crate::message_log;
    use test_timeout::tokio_timeout_test;

    fn line(origin: &str, text: &str) -> PendingMessage {
        PendingMessage {
            origin: ConnectionId::from(origin),
            kind: MessageKind::Chat,
            text: text.to_string(),
        }
    }

    #[test_timeout::timeout]
    fn chat_lines_escape_names_and_decode_spaces() {
        let registry = ConnectionRegistry::new();
        let reg = registry.create("<b>eve</b>");
        let msg = PendingMessage::chat(&reg.connection, "Hi_all");
        assert_eq!(msg.text, "&lt;b&gt;eve&lt;/b&gt;: Hi all");
        assert_eq!(
            PendingMessage::joined(&reg.connection).text,
            "&lt;b&gt;eve&lt;/b&gt; joined the chat."
        );
    }

    #[test_timeout::timeout]
    fn deliver_appends_then_wakes_everyone() {
        let registry = ConnectionRegistry::new();
        let log = message_log::shared(10);
        let mut alice = registry.create("alice");
        let mut bob = registry.create("bob");
        let (broadcaster, _handle) = Broadcaster::new(log.clone(), registry.clone());

        let report = broadcaster.deliver(line("x", "alice: Hi"));

        assert_eq!(report.delivered, 2);
        assert_eq!(log.read().snapshot(), vec!["alice: Hi"]);
        assert_eq!(alice.mailbox.try_recv(), Some(Wake::Broadcast));
        assert_eq!(bob.mailbox.try_recv(), Some(Wake::Broadcast));
    }

    #[tokio_timeout_test(10)]
    async fn slow_consumer_does_not_stall_others() {
        let registry = ConnectionRegistry::new();
        let log = message_log::shared(10);
        // Never drained: its mailbox fills after the first wake.
        let _stalled = registry.create("stalled");
        let mut live = registry.create("live");
        let (handle, task) = Broadcaster::spawn(log.clone(), registry.clone());

        for i in 0..3 {
            handle.publish(line("x", &format!("m{i}"))).expect("publish");
            assert_eq!(live.mailbox.recv().await, Some(Wake::Broadcast));
        }
        drop(handle);
        task.await.expect("broadcaster task");

        assert_eq!(log.read().snapshot(), vec!["m0", "m1", "m2"]);
    }

    #[tokio_timeout_test(10)]
    async fn concurrent_senders_keep_their_own_order() {
        let registry = ConnectionRegistry::new();
        let log = message_log::shared(64);
        let (handle, task) = Broadcaster::spawn(log.clone(), registry);

        let mut senders = Vec::new();
        for who in ["a", "b"] {
            let handle = handle.clone();
            senders.push(tokio::spawn(async move {
                for i in 0..20 {
                    handle
                        .publish(line(who, &format!("{who}{i}")))
                        .expect("publish");
                    tokio::task::yield_now().await;
                }
            }));
        }
        for sender in senders {
            sender.await.expect("sender task");
        }
        drop(handle);
        task.await.expect("broadcaster task");

        let entries = log.read().snapshot();
        assert_eq!(entries.len(), 40);
        for who in ["a", "b"] {
            let seen: Vec<&String> = entries.iter().filter(|e| e.starts_with(who)).collect();
            let expected: Vec<String> = (0..20).map(|i| format!("{who}{i}")).collect();
            assert_eq!(seen, expected.iter().collect::<Vec<_>>());
        }
    }

    #[tokio_timeout_test(10)]
    async fn publish_after_stop_reports_error() {
        let registry = ConnectionRegistry::new();
        let (broadcaster, handle) = Broadcaster::new(message_log::shared(2), registry);
        drop(broadcaster);
        assert!(matches!(
            handle.publish(line("x", "late")),
            Err(BroadcastError::Stopped)
        ));
    }
}
