use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

/// One pending render is enough: every render reads the latest shared state.
const MAILBOX_DEPTH: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ConnectionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a session is being asked to re-render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Broadcast,
    Draft,
}

impl Wake {
    pub fn label(self) -> &'static str {
        match self {
            Wake::Broadcast => "broadcast",
            Wake::Draft => "draft",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeOutcome {
    Delivered,
    /// A render was already pending; this wake folds into it.
    Coalesced,
    Closed,
}

impl WakeOutcome {
    pub fn metric_label(self) -> &'static str {
        match self {
            WakeOutcome::Delivered => "delivered",
            WakeOutcome::Coalesced => "coalesced",
            WakeOutcome::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftState {
    /// Unsent text in path encoding.
    pub text: String,
    pub submission_seq: u64,
}

/// Server-side record of one chat participant.
pub struct Connection {
    id: ConnectionId,
    display_name: String,
    draft: Mutex<DraftState>,
    chunk_seq: AtomicU64,
    wake_tx: mpsc::Sender<Wake>,
}

impl Connection {
    pub(crate) fn new(display_name: String) -> (Self, Mailbox) {
        let (wake_tx, wake_rx) = mpsc::channel(MAILBOX_DEPTH);
        let connection = Self {
            id: ConnectionId::generate(),
            display_name,
            draft: Mutex::new(DraftState::default()),
            chunk_seq: AtomicU64::new(0),
            wake_tx,
        };
        (connection, Mailbox { rx: wake_rx })
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Locks the draft for a read-modify-write. Never hold the guard across an await.
    pub fn lock_draft(&self) -> MutexGuard<'_, DraftState> {
        self.draft.lock()
    }

    pub fn draft(&self) -> DraftState {
        self.draft.lock().clone()
    }

    pub fn chunk_seq(&self) -> u64 {
        self.chunk_seq.load(Ordering::Acquire)
    }

    /// Moves to the next chunk id and returns it.
    pub fn advance_chunk(&self) -> u64 {
        self.chunk_seq.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn wake(&self, reason: Wake) -> WakeOutcome {
        match self.wake_tx.try_send(reason) {
            Ok(()) => WakeOutcome::Delivered,
            Err(TrySendError::Full(_)) => WakeOutcome::Coalesced,
            Err(TrySendError::Closed(_)) => WakeOutcome::Closed,
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("chunk_seq", &self.chunk_seq())
            .finish_non_exhaustive()
    }
}

/// Receiving side of a connection's wake channel, owned by its session handler.
pub struct Mailbox {
    rx: mpsc::Receiver<Wake>,
}

impl Mailbox {
    pub async fn recv(&mut self) -> Option<Wake> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Wake> {
        self.rx.try_recv().ok()
    }
}
