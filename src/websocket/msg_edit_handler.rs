use tracing::{debug, info};

use crate::error::RealtimeError;
use crate::models::{DocumentChange, LockOutcome, Selection, SendMessage};
use crate::websocket::connctx::ConnCtx;
use crate::websocket::msg_session_handler::validate_document_id;
use crate::AppState;

/// Document scoped events are only accepted from session participants.
fn require_participant(state: &AppState, ctx: &ConnCtx, document_id: &str) -> Result<(), RealtimeError> {
    validate_document_id(document_id)?;
    if !state.sessions.is_participant(document_id, ctx.user_id()) {
        return Err(RealtimeError::Authorization(format!(
            "Join a session of document {} first",
            document_id
        )));
    }
    Ok(())
}

fn validate_selection(selection: Option<Selection>) -> Result<(), RealtimeError> {
    match selection {
        Some(s) if s.end < s.start => Err(RealtimeError::Validation(format!(
            "Selection end {} is before start {}",
            s.end, s.start
        ))),
        _ => Ok(()),
    }
}

/// Handle document-change: validated, then relayed to the other participants.
pub async fn handle_document_change(
    state: &AppState,
    ctx: &ConnCtx,
    document_id: String,
    change: DocumentChange,
) -> Result<(), RealtimeError> {
    require_participant(state, ctx, &document_id)?;
    state
        .sessions
        .apply_document_change(&document_id, ctx.user_id(), &change)?;

    state
        .bridge
        .send_to_document(
            &document_id,
            SendMessage::DocumentChangeBroadcast {
                document_id: document_id.clone(),
                user_id: ctx.user_id().to_string(),
                change,
            },
            Some(ctx.connection_id),
        )
        .await;
    Ok(())
}

pub async fn handle_cursor_update(
    state: &AppState,
    ctx: &ConnCtx,
    document_id: String,
    position: u64,
    selection: Option<Selection>,
    field: Option<String>,
) -> Result<(), RealtimeError> {
    require_participant(state, ctx, &document_id)?;
    validate_selection(selection)?;
    let cursor = state
        .sessions
        .update_cursor(&document_id, ctx.user_id(), position, selection, field);

    state
        .bridge
        .send_to_document(
            &document_id,
            SendMessage::CursorChanged {
                document_id: document_id.clone(),
                cursor,
            },
            Some(ctx.connection_id),
        )
        .await;
    Ok(())
}

pub async fn handle_selection_update(
    state: &AppState,
    ctx: &ConnCtx,
    document_id: String,
    selection: Option<Selection>,
    field: Option<String>,
) -> Result<(), RealtimeError> {
    require_participant(state, ctx, &document_id)?;
    validate_selection(selection)?;
    let cursor = state
        .sessions
        .update_selection(&document_id, ctx.user_id(), selection, field);

    state
        .bridge
        .send_to_document(
            &document_id,
            SendMessage::SelectionChanged {
                document_id: document_id.clone(),
                user_id: ctx.user_id().to_string(),
                selection: cursor.selection,
                field: cursor.field,
            },
            Some(ctx.connection_id),
        )
        .await;
    Ok(())
}

/// Handle request-lock. A grant is announced to the whole room, the
/// requester included; a denial only goes back to the requester.
pub async fn handle_request_lock(
    state: &AppState,
    ctx: &ConnCtx,
    document_id: String,
    section: String,
) -> Result<(), RealtimeError> {
    require_participant(state, ctx, &document_id)?;
    if section.trim().is_empty() {
        return Err(RealtimeError::Validation("section must not be empty".to_string()));
    }

    match state.sessions.request_lock(&document_id, &section, ctx.user_id()) {
        LockOutcome::Granted => {
            info!("Lock {}/{} granted to {}", document_id, section, ctx.user_id());
            state
                .bridge
                .send_to_document(
                    &document_id,
                    SendMessage::LockGranted {
                        document_id: document_id.clone(),
                        section,
                        user_id: ctx.user_id().to_string(),
                    },
                    None,
                )
                .await;
        }
        LockOutcome::Denied { holder } => {
            state.bridge.send_to_connection(
                ctx.connection_id,
                &SendMessage::LockDenied {
                    document_id,
                    section,
                    holder,
                },
            );
        }
    }
    Ok(())
}

pub async fn handle_release_lock(
    state: &AppState,
    ctx: &ConnCtx,
    document_id: String,
    section: String,
) -> Result<(), RealtimeError> {
    require_participant(state, ctx, &document_id)?;
    if !state.sessions.release_lock(&document_id, &section, ctx.user_id())? {
        debug!("Release of unlocked section {}/{} ignored", document_id, section);
        return Ok(());
    }

    state
        .bridge
        .send_to_document(
            &document_id,
            SendMessage::LockReleased {
                document_id: document_id.clone(),
                section,
                user_id: ctx.user_id().to_string(),
            },
            None,
        )
        .await;
    Ok(())
}

/// Handle typing-start and typing-stop. Repeats are not rebroadcast.
pub async fn handle_typing(
    state: &AppState,
    ctx: &ConnCtx,
    document_id: String,
    field: Option<String>,
    is_typing: bool,
) -> Result<(), RealtimeError> {
    require_participant(state, ctx, &document_id)?;
    let changed = if is_typing {
        state.sessions.typing_start(&document_id, ctx.user_id())
    } else {
        state.sessions.typing_stop(&document_id, ctx.user_id())
    };
    if !changed {
        return Ok(());
    }

    state
        .bridge
        .send_to_document(
            &document_id,
            SendMessage::TypingChanged {
                document_id: document_id.clone(),
                user_id: ctx.user_id().to_string(),
                field,
                is_typing,
            },
            Some(ctx.connection_id),
        )
        .await;
    Ok(())
}

/// Handle resolve-conflict: the resolution is relayed as is.
pub async fn handle_resolve_conflict(
    state: &AppState,
    ctx: &ConnCtx,
    document_id: String,
    resolution: serde_json::Value,
) -> Result<(), RealtimeError> {
    require_participant(state, ctx, &document_id)?;
    if resolution.is_null() {
        return Err(RealtimeError::Validation("resolution must not be empty".to_string()));
    }

    state
        .bridge
        .send_to_document(
            &document_id,
            SendMessage::ConflictResolutionBroadcast {
                document_id: document_id.clone(),
                user_id: ctx.user_id().to_string(),
                resolution,
            },
            Some(ctx.connection_id),
        )
        .await;
    Ok(())
}
