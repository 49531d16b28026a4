use tracing::info;
use uuid::Uuid;

use crate::error::RealtimeError;
use crate::models::SendMessage;
use crate::presence::doc_room;
use crate::websocket::connctx::ConnCtx;
use crate::AppState;

pub(crate) fn validate_document_id(document_id: &str) -> Result<(), RealtimeError> {
    if document_id.trim().is_empty() {
        return Err(RealtimeError::Validation("documentId must not be empty".to_string()));
    }
    Ok(())
}

/// Handle create-session: the caller owns and joins the new session.
pub async fn handle_create_session(
    state: &AppState,
    ctx: &ConnCtx,
    document_id: String,
) -> Result<(), RealtimeError> {
    validate_document_id(&document_id)?;
    let session_id = state.sessions.create_session(&document_id, ctx.user_id());
    state.transport.join_room(ctx.connection_id, &doc_room(&document_id));

    state.bridge.send_to_connection(
        ctx.connection_id,
        &SendMessage::SessionCreated {
            document_id,
            session_id,
        },
    );
    Ok(())
}

/// Handle join-session
pub async fn handle_join_session(
    state: &AppState,
    ctx: &ConnCtx,
    document_id: String,
    session_id: Option<Uuid>,
) -> Result<(), RealtimeError> {
    validate_document_id(&document_id)?;
    let outcome = state.sessions.join_session(&document_id, session_id, ctx.user_id());
    state.transport.join_room(ctx.connection_id, &doc_room(&document_id));

    let participant_count = outcome.snapshot.participant_count;
    state.bridge.send_to_connection(
        ctx.connection_id,
        &SendMessage::SessionJoined {
            document_id: document_id.clone(),
            session_id: outcome.session_id,
            snapshot: outcome.snapshot,
            viewers: state.presence.get_viewers_of_context(&document_id),
        },
    );

    state
        .bridge
        .send_to_document(
            &document_id,
            SendMessage::UserJoined {
                document_id: document_id.clone(),
                session_id: outcome.session_id,
                user_id: ctx.user_id().to_string(),
                participant_count,
            },
            Some(ctx.connection_id),
        )
        .await;
    Ok(())
}

/// Handle leave-session
pub async fn handle_leave_session(
    state: &AppState,
    ctx: &ConnCtx,
    document_id: String,
    session_id: Uuid,
) -> Result<(), RealtimeError> {
    validate_document_id(&document_id)?;
    let outcome = state.sessions.leave_session(&document_id, session_id, ctx.user_id());
    if !outcome.session_found {
        return Err(RealtimeError::NotFound(format!(
            "Session {} of document {}",
            session_id, document_id
        )));
    }

    if !state.sessions.is_participant(&document_id, ctx.user_id()) {
        state.transport.leave_room(ctx.connection_id, &doc_room(&document_id));
    }

    state
        .bridge
        .send_to_document(
            &document_id,
            SendMessage::UserLeft {
                document_id: document_id.clone(),
                session_id: Some(session_id),
                user_id: ctx.user_id().to_string(),
            },
            Some(ctx.connection_id),
        )
        .await;
    broadcast_released_state(
        state,
        &document_id,
        ctx.user_id(),
        &outcome.released_locks,
        outcome.was_typing,
    )
    .await;
    Ok(())
}

/// Tell the document room about locks and typing flags a user lost.
pub(crate) async fn broadcast_released_state(
    state: &AppState,
    document_id: &str,
    user_id: &str,
    released_locks: &[String],
    was_typing: bool,
) {
    for section in released_locks {
        info!("Released lock {}/{} held by {}", document_id, section, user_id);
        state
            .bridge
            .send_to_document(
                document_id,
                SendMessage::LockReleased {
                    document_id: document_id.to_string(),
                    section: section.clone(),
                    user_id: user_id.to_string(),
                },
                None,
            )
            .await;
    }
    if was_typing {
        state
            .bridge
            .send_to_document(
                document_id,
                SendMessage::TypingChanged {
                    document_id: document_id.to_string(),
                    user_id: user_id.to_string(),
                    field: None,
                    is_typing: false,
                },
                None,
            )
            .await;
    }
}
