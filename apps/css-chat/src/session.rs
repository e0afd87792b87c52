use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::broadcaster::PendingMessage;
use crate::connection::{Connection, Mailbox, Wake};
use crate::metrics;
use crate::registry::Registration;
use crate::render::{self, ChunkView};
use crate::state::ChatState;

pub type ChunkStream = ReceiverStream<Result<Bytes, Infallible>>;

#[derive(Debug, Error)]
#[error("client transport closed")]
pub struct TransportClosed;

/// Writing half of one streaming response body.
pub struct ChunkSink {
    tx: mpsc::Sender<Result<Bytes, Infallible>>,
}

impl ChunkSink {
    pub fn channel(depth: usize) -> (Self, ChunkStream) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        (Self { tx }, ReceiverStream::new(rx))
    }

    pub async fn write(&self, chunk: String) -> Result<(), TransportClosed> {
        self.tx
            .send(Ok(Bytes::from(chunk)))
            .await
            .map_err(|_| TransportClosed)
    }

    /// Resolves once the response body has been dropped.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    TransportClosed,
    WriteFailed,
    MailboxClosed,
    Shutdown,
}

impl CloseReason {
    pub fn label(self) -> &'static str {
        match self {
            CloseReason::TransportClosed => "transport_closed",
            CloseReason::WriteFailed => "write_failed",
            CloseReason::MailboxClosed => "mailbox_closed",
            CloseReason::Shutdown => "shutdown",
        }
    }
}

enum Event {
    Wake(Option<Wake>),
    TransportClosed,
    Shutdown,
}

/// Long-lived loop bound to one streaming response.
pub struct SessionHandler {
    state: ChatState,
    connection: Arc<Connection>,
    mailbox: Mailbox,
    sink: ChunkSink,
    announced: bool,
    chunks_emitted: u64,
}

impl SessionHandler {
    pub fn new(state: ChatState, registration: Registration, sink: ChunkSink) -> Self {
        Self {
            state,
            connection: registration.connection,
            mailbox: registration.mailbox,
            sink,
            announced: false,
            chunks_emitted: 0,
        }
    }

    pub async fn run(mut self) {
        let opening = format!("{}{}", render::page_shell(), self.render(0));
        if let Err(reason) = self.emit(opening).await {
            return self.close(reason);
        }

        self.announced = self.publish(PendingMessage::joined(&self.connection));

        let reason = loop {
            let event = tokio::select! {
                biased;
                () = self.sink.closed() => Event::TransportClosed,
                () = self.state.shutdown_requested() => Event::Shutdown,
                wake = self.mailbox.recv() => Event::Wake(wake),
            };
            let wake = match event {
                Event::TransportClosed => break CloseReason::TransportClosed,
                Event::Shutdown => break CloseReason::Shutdown,
                Event::Wake(None) => break CloseReason::MailboxClosed,
                Event::Wake(Some(wake)) => wake,
            };

            let chunk_id = self.connection.advance_chunk();
            let chunk = self.render(chunk_id);
            if let Err(reason) = self.emit(chunk).await {
                break reason;
            }
            debug!(
                connection_id = %self.connection.id(),
                chunk_id,
                reason = wake.label(),
                "chunk emitted"
            );
        };

        self.close(reason)
    }

    fn render(&self, chunk_id: u64) -> String {
        let messages = self.state.log().read().snapshot();
        let draft = self.connection.draft();
        render::chunk(&ChunkView {
            chunk_id,
            connection_id: self.connection.id(),
            display_name: self.connection.display_name(),
            draft: &draft.text,
            submission_seq: draft.submission_seq,
            messages: &messages,
            keyboard: self.state.keyboard(),
        })
    }

    /// Writes one chunk, abandoning the write once shutdown is requested.
    async fn emit(&mut self, chunk: String) -> Result<(), CloseReason> {
        let written = tokio::select! {
            biased;
            () = self.state.shutdown_requested() => return Err(CloseReason::Shutdown),
            written = self.sink.write(chunk) => written,
        };
        written.map_err(|TransportClosed| CloseReason::WriteFailed)?;
        self.chunks_emitted += 1;
        metrics::record_chunk_emitted();
        Ok(())
    }

    fn publish(&self, message: PendingMessage) -> bool {
        match self.state.broadcaster().publish(message) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    connection_id = %self.connection.id(),
                    error = %err,
                    "announcement dropped"
                );
                false
            }
        }
    }

    fn close(self, reason: CloseReason) {
        let registry = self.state.registry();
        registry.remove(self.connection.id());
        metrics::record_connection_closed(registry.len());
        if self.announced {
            self.publish(PendingMessage::left(&self.connection));
        }
        info!(
            connection_id = %self.connection.id(),
            display_name = %self.connection.display_name(),
            chunks = self.chunks_emitted,
            reason = reason.label(),
            "session closed"
        );
    }
}

/// Registers a connection and starts streaming its session in the background.
pub fn spawn_session(state: ChatState, display_name: String) -> (Arc<Connection>, ChunkStream) {
    let registration = state.registry().create(display_name);
    let connection = Arc::clone(&registration.connection);
    metrics::record_connection_opened(state.registry().len());
    info!(
        connection_id = %connection.id(),
        display_name = %connection.display_name(),
        "session opened"
    );

    let (sink, stream) = ChunkSink::channel(state.config().chunk_buffer);
    let handler = SessionHandler::new(state, registration, sink);
    tokio::spawn(handler.run());
    (connection, stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChatConfig;
    use crate::interaction;
    use std::time::Duration;
    use test_timeout::tokio_timeout_test;
    use tokio_stream::StreamExt;

    async fn next_chunk(stream: &mut ChunkStream) -> String {
        let frame = stream.next().await.expect("stream open");
        let bytes = frame.unwrap_or_else(|never| match never {});
        String::from_utf8(bytes.to_vec()).expect("utf8 chunk")
    }

    #[tokio_timeout_test(10)]
    async fn opens_with_shell_then_renders_join() {
        let (state, _task) = ChatState::start(ChatConfig::default());
        let (connection, mut stream) = spawn_session(state.clone(), "alice".into());

        let opening = next_chunk(&mut stream).await;
        assert!(opening.starts_with("<!DOCTYPE html>"));
        assert!(opening.contains("<div id=\"chunk-0\">"));
        assert!(opening.contains("<p>alice: </p>"));

        let joined = next_chunk(&mut stream).await;
        assert!(joined.contains("<div id=\"chunk-1\">"));
        assert!(joined.contains("#chunk-0{display:none}"));
        assert!(joined.contains("<p>alice joined the chat.</p>"));
        assert_eq!(connection.chunk_seq(), 1);
    }

    #[tokio_timeout_test(10)]
    async fn draft_changes_render_on_own_stream() {
        let (state, _task) = ChatState::start(ChatConfig::default());
        let (connection, mut stream) = spawn_session(state.clone(), "alice".into());
        next_chunk(&mut stream).await;
        next_chunk(&mut stream).await;

        interaction::apply_letter(&state, connection.id(), "0", "H").expect("letter");
        let chunk = next_chunk(&mut stream).await;
        assert!(chunk.contains("<p>alice: H</p>"));
        assert!(chunk.contains(&format!("/letter/{}/0/Hi)", connection.id())));
    }

    #[tokio_timeout_test(10)]
    async fn dropping_stream_unregisters_and_announces_leave() {
        let (state, _task) = ChatState::start(ChatConfig::default());
        let (_observer, mut observer_stream) = spawn_session(state.clone(), "bob".into());
        next_chunk(&mut observer_stream).await;

        let (leaver, mut stream) = spawn_session(state.clone(), "alice".into());
        next_chunk(&mut stream).await;
        drop(stream);

        while state.registry().lookup(leaver.id()).is_some() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        loop {
            let chunk = next_chunk(&mut observer_stream).await;
            if chunk.contains("alice left the chat.") {
                break;
            }
        }
        assert_eq!(state.registry().len(), 1);
    }

    #[tokio_timeout_test(10)]
    async fn shutdown_ends_session_blocked_on_unread_stream() {
        let (state, _task) = ChatState::start(ChatConfig {
            chunk_buffer: 1,
            ..ChatConfig::default()
        });
        // Held but never read, so the second chunk cannot be written.
        let (connection, _stream) = spawn_session(state.clone(), "alice".into());
        for draft in ["A", "AB", "ABC", "ABCD", "ABCDE"] {
            let _ = interaction::apply_letter(&state, connection.id(), "0", draft);
            tokio::task::yield_now().await;
        }

        state.shutdown();
        while state.registry().lookup(connection.id()).is_some() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio_timeout_test(10)]
    async fn shutdown_ends_open_streams() {
        let (state, _task) = ChatState::start(ChatConfig::default());
        let (connection, mut stream) = spawn_session(state.clone(), "alice".into());
        next_chunk(&mut stream).await;

        state.shutdown();
        while stream.next().await.is_some() {}
        assert!(state.registry().lookup(connection.id()).is_none());
    }
}
