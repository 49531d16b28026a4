use tracing::{debug, warn};

use crate::error::RealtimeError;
use crate::models::{ReceivedMessage, SendMessage};
use crate::ratelimit::EventClass;
use crate::websocket::connctx::ConnCtx;
use crate::websocket::msg_announce_handler::handle_announce;
use crate::websocket::msg_edit_handler::{
    handle_cursor_update, handle_document_change, handle_release_lock, handle_request_lock,
    handle_resolve_conflict, handle_selection_update, handle_typing,
};
use crate::websocket::msg_presence_handler::{handle_ping, handle_update_activity, handle_update_status};
use crate::websocket::msg_session_handler::{
    handle_create_session, handle_join_session, handle_leave_session,
};
use crate::AppState;

/// Budget an inbound event is charged against.
pub fn event_class(msg: &ReceivedMessage) -> EventClass {
    match msg {
        ReceivedMessage::CursorUpdate { .. }
        | ReceivedMessage::SelectionUpdate { .. }
        | ReceivedMessage::TypingStart { .. }
        | ReceivedMessage::TypingStop { .. } => EventClass::HighFrequency,
        ReceivedMessage::DocumentChange { .. }
        | ReceivedMessage::RequestLock { .. }
        | ReceivedMessage::ReleaseLock { .. }
        | ReceivedMessage::ResolveConflict { .. } => EventClass::Critical,
        ReceivedMessage::Announce { .. } => EventClass::Broadcast,
        ReceivedMessage::UpdateStatus { .. }
        | ReceivedMessage::UpdateActivity { .. }
        | ReceivedMessage::CreateSession { .. }
        | ReceivedMessage::JoinSession { .. }
        | ReceivedMessage::LeaveSession { .. }
        | ReceivedMessage::Ping => EventClass::General,
    }
}

/// Parse, rate limit and dispatch one text frame. Failures are reported to
/// the caller and never close the connection.
pub async fn handle_frame(state: &AppState, ctx: &ConnCtx, text: &str) {
    let msg: ReceivedMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            debug!("Malformed frame from {}: {}", ctx.connection_id, e);
            let err = RealtimeError::Validation(e.to_string());
            state
                .bridge
                .send_to_connection(ctx.connection_id, &SendMessage::error(err.code(), err.to_string(), None));
            return;
        }
    };

    let event = msg.event_name();
    // The limiter's handler already told the caller when to retry.
    if let Err(e) = state
        .rate_limiter
        .check_event(ctx.connection_id, event_class(&msg), event)
        .into_result()
    {
        debug!("Dropped {} from {}: {}", event, ctx.connection_id, e);
        return;
    }

    if let Err(e) = handle_message(state, ctx, msg).await {
        warn!("Rejected {} from {} ({}): {}", event, ctx.user_id(), ctx.connection_id, e);
        state
            .bridge
            .send_to_connection(ctx.connection_id, &SendMessage::error(e.code(), e.to_string(), Some(event)));
    }
}

pub async fn handle_message(
    state: &AppState,
    ctx: &ConnCtx,
    msg: ReceivedMessage,
) -> Result<(), RealtimeError> {
    match msg {
        ReceivedMessage::UpdateStatus { status } => handle_update_status(state, ctx, status).await,
        ReceivedMessage::UpdateActivity { activity, context } => {
            handle_update_activity(state, ctx, activity, context).await
        }
        ReceivedMessage::CreateSession { document_id } => {
            handle_create_session(state, ctx, document_id).await
        }
        ReceivedMessage::JoinSession { document_id, session_id } => {
            handle_join_session(state, ctx, document_id, session_id).await
        }
        ReceivedMessage::LeaveSession { document_id, session_id } => {
            handle_leave_session(state, ctx, document_id, session_id).await
        }
        ReceivedMessage::DocumentChange { document_id, change } => {
            handle_document_change(state, ctx, document_id, change).await
        }
        ReceivedMessage::CursorUpdate { document_id, position, selection, field } => {
            handle_cursor_update(state, ctx, document_id, position, selection, field).await
        }
        ReceivedMessage::SelectionUpdate { document_id, selection, field } => {
            handle_selection_update(state, ctx, document_id, selection, field).await
        }
        ReceivedMessage::RequestLock { document_id, section } => {
            handle_request_lock(state, ctx, document_id, section).await
        }
        ReceivedMessage::ReleaseLock { document_id, section } => {
            handle_release_lock(state, ctx, document_id, section).await
        }
        ReceivedMessage::TypingStart { document_id, field } => {
            handle_typing(state, ctx, document_id, field, true).await
        }
        ReceivedMessage::TypingStop { document_id, field } => {
            handle_typing(state, ctx, document_id, field, false).await
        }
        ReceivedMessage::ResolveConflict { document_id, resolution } => {
            handle_resolve_conflict(state, ctx, document_id, resolution).await
        }
        ReceivedMessage::Announce { message } => handle_announce(state, ctx, message).await,
        ReceivedMessage::Ping => handle_ping(state, ctx),
    }
}
