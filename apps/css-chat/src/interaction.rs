use thiserror::Error;

use crate::broadcaster::PendingMessage;
use crate::config::StalePolicy;
use crate::connection::{ConnectionId, Wake, WakeOutcome};
use crate::draft::{DraftEdit, DraftError};
use crate::state::ChatState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Letter,
    Send,
}

impl Action {
    pub fn label(self) -> &'static str {
        match self {
            Action::Letter => "letter",
            Action::Send => "send",
        }
    }
}

/// Reasons an interaction request leaves all state untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InteractionRejection {
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),
    #[error("stale submission sequence {presented:?}; connection is at {current}")]
    StaleSubmission { current: u64, presented: String },
    #[error("malformed draft: {0}")]
    MalformedDraft(#[from] DraftError),
    #[error("draft is empty")]
    EmptyDraft,
    #[error("broadcaster is not accepting messages")]
    BroadcasterStopped,
}

impl InteractionRejection {
    pub fn metric_label(&self) -> &'static str {
        match self {
            InteractionRejection::UnknownConnection(_) => "unknown_connection",
            InteractionRejection::StaleSubmission { .. } => "stale_submission",
            InteractionRejection::MalformedDraft(err) => err.metric_label(),
            InteractionRejection::EmptyDraft => "empty_draft",
            InteractionRejection::BroadcasterStopped => "broadcaster_stopped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftUpdated {
    pub draft: String,
    pub wake: WakeOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub submission_seq: u64,
    pub wake: WakeOutcome,
}

/// Replaces the addressed connection's draft with the one carried by a `letter` link.
pub fn apply_letter(
    state: &ChatState,
    id: &ConnectionId,
    presented_seq: &str,
    raw_draft: &str,
) -> Result<DraftUpdated, InteractionRejection> {
    let connection = state
        .registry()
        .lookup(id)
        .ok_or_else(|| InteractionRejection::UnknownConnection(id.clone()))?;
    let next = DraftEdit::parse(raw_draft)?.resolve();

    let draft = {
        let mut guard = connection.lock_draft();
        check_sequence(state.stale_policy(), guard.submission_seq, presented_seq)?;
        guard.text = next;
        guard.text.clone()
    };

    let wake = connection.wake(Wake::Draft);
    Ok(DraftUpdated { draft, wake })
}

/// Publishes the addressed connection's draft as a chat message and clears it.
pub fn submit(
    state: &ChatState,
    id: &ConnectionId,
    presented_seq: &str,
) -> Result<Submitted, InteractionRejection> {
    let connection = state
        .registry()
        .lookup(id)
        .ok_or_else(|| InteractionRejection::UnknownConnection(id.clone()))?;

    let submission_seq = {
        let mut guard = connection.lock_draft();
        check_sequence(state.stale_policy(), guard.submission_seq, presented_seq)?;
        if guard.text.is_empty() {
            return Err(InteractionRejection::EmptyDraft);
        }
        state
            .broadcaster()
            .publish(PendingMessage::chat(&connection, &guard.text))
            .map_err(|_| InteractionRejection::BroadcasterStopped)?;
        guard.text.clear();
        guard.submission_seq += 1;
        guard.submission_seq
    };

    // The broadcast wake may have been coalesced before the draft was cleared.
    let wake = connection.wake(Wake::Draft);
    Ok(Submitted {
        submission_seq,
        wake,
    })
}

fn check_sequence(
    policy: StalePolicy,
    current: u64,
    presented: &str,
) -> Result<(), InteractionRejection> {
    if policy == StalePolicy::Accept {
        return Ok(());
    }
    match presented.parse::<u64>() {
        Ok(seq) if seq == current => Ok(()),
        _ => Err(InteractionRejection::StaleSubmission {
            current,
            presented: presented.to_string(),
        }),
    }
}
