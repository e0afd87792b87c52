use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::connection::ConnectionId;
use crate::interaction::{self, Action, InteractionRejection};
use crate::metrics;
use crate::session;
use crate::state::ChatState;

pub const WELCOME_TEXT: &str =
    "Welcome to the CSS only web chat.\nGo to /connect/<some-username> to join.";
const INVALID_USERNAME_TEXT: &str = "Invalid username";

pub fn router(state: ChatState) -> Router {
    Router::new()
        .route("/", get(welcome))
        .route("/connect/:display_name", get(connect))
        .route(
            "/letter/:connection_id/:submission_seq/:draft",
            get(letter),
        )
        .route("/send/:connection_id/:submission_seq", get(send))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn welcome() -> &'static str {
    WELCOME_TEXT
}

async fn connect(State(state): State<ChatState>, Path(display_name): Path<String>) -> Response {
    if display_name.trim().is_empty() {
        return invalid_username();
    }
    let (_connection, stream) = session::spawn_session(state, display_name);
    (
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

async fn letter(
    State(state): State<ChatState>,
    Path((connection_id, submission_seq, draft)): Path<(String, String, String)>,
) -> Response {
    let id = ConnectionId::from(connection_id);
    let outcome = interaction::apply_letter(&state, &id, &submission_seq, &draft);
    match outcome {
        Ok(update) => {
            metrics::record_interaction(Action::Letter.label());
            metrics::record_self_wake(update.wake);
            debug!(connection_id = %id, draft = %update.draft, "draft updated");
        }
        Err(rejection) => record_rejection(Action::Letter, &id, &rejection),
    }
    acknowledged()
}

async fn send(
    State(state): State<ChatState>,
    Path((connection_id, submission_seq)): Path<(String, String)>,
) -> Response {
    let id = ConnectionId::from(connection_id);
    match interaction::submit(&state, &id, &submission_seq) {
        Ok(submitted) => {
            metrics::record_interaction(Action::Send.label());
            metrics::record_self_wake(submitted.wake);
            debug!(
                connection_id = %id,
                submission_seq = submitted.submission_seq,
                "message submitted"
            );
        }
        Err(rejection) => record_rejection(Action::Send, &id, &rejection),
    }
    acknowledged()
}

async fn not_found(uri: Uri) -> Response {
    let path = uri.path();
    if path == "/connect" || path.starts_with("/connect/") {
        return invalid_username();
    }
    (StatusCode::NOT_FOUND, format!("404- {path} not found.")).into_response()
}

/// Empty reply for interaction links. Must never be served from a cache.
fn acknowledged() -> Response {
    (
        StatusCode::NO_CONTENT,
        [(header::CACHE_CONTROL, "no-store")],
    )
        .into_response()
}

fn invalid_username() -> Response {
    (StatusCode::BAD_REQUEST, INVALID_USERNAME_TEXT).into_response()
}

fn record_rejection(action: Action, id: &ConnectionId, rejection: &InteractionRejection) {
    metrics::record_rejection(action.label(), rejection.metric_label());
    debug!(
        connection_id = %id,
        action = action.label(),
        reason = %rejection,
        "interaction ignored"
    );
}
