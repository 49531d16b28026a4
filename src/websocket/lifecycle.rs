use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

use crate::broadcast::GLOBAL_ROOM;
use crate::models::{ConnectionMeta, SendMessage};
use crate::presence::{org_room, user_room, DisconnectOutcome};
use crate::presence::registry::DOC_ROOM_PREFIX;
use crate::websocket::connctx::ConnCtx;
use crate::websocket::msg_session_handler::broadcast_released_state;
use crate::AppState;

/// Attach a new socket: presence, default rooms and the welcome snapshot.
pub async fn on_connect(
    state: &AppState,
    ctx: &ConnCtx,
    sender: UnboundedSender<String>,
    meta: ConnectionMeta,
) -> usize {
    state.transport.attach(ctx.connection_id, sender);
    let count = state
        .presence
        .on_connect(ctx.user_id(), ctx.connection_id, meta)
        .await;

    state.transport.join_room(ctx.connection_id, GLOBAL_ROOM);
    state.transport.join_room(ctx.connection_id, &user_room(ctx.user_id()));
    if let Some(org_id) = &ctx.identity.org_id {
        state.transport.join_room(ctx.connection_id, &org_room(org_id));
    }

    state.bridge.send_to_connection(
        ctx.connection_id,
        &SendMessage::Welcome {
            connection_id: ctx.connection_id,
            user_id: ctx.user_id().to_string(),
            online_users: state.presence.get_online_users(),
        },
    );
    info!(
        "Connection {} of user {} attached ({} open)",
        ctx.connection_id,
        ctx.user_id(),
        count
    );
    count
}

/// Detach a closed socket. Documents the user no longer has a connection
/// in lose the user's sessions, locks, cursor and typing flag.
pub async fn on_disconnect(state: &AppState, ctx: &ConnCtx) -> Option<DisconnectOutcome> {
    let doc_rooms: Vec<String> = state
        .registry
        .rooms_of(ctx.connection_id)
        .into_iter()
        .filter(|room| room.starts_with(DOC_ROOM_PREFIX))
        .collect();

    state.transport.detach(ctx.connection_id);
    state.rate_limiter.forget_connection(ctx.connection_id);
    let outcome = state.presence.on_disconnect(ctx.connection_id).await;

    for room in doc_rooms {
        if state.registry.user_in_room(ctx.user_id(), &room, None) {
            continue;
        }
        let Some(document_id) = room.strip_prefix(DOC_ROOM_PREFIX) else {
            continue;
        };
        let cleanup = state.sessions.release_user_in_document(document_id, ctx.user_id());
        for session_id in &cleanup.left_sessions {
            state
                .bridge
                .send_to_room(
                    &room,
                    SendMessage::UserLeft {
                        document_id: document_id.to_string(),
                        session_id: Some(*session_id),
                        user_id: ctx.user_id().to_string(),
                    },
                    None,
                )
                .await;
        }
        broadcast_released_state(
            state,
            document_id,
            ctx.user_id(),
            &cleanup.released_locks,
            cleanup.was_typing,
        )
        .await;
    }

    info!("Connection {} of user {} detached", ctx.connection_id, ctx.user_id());
    outcome
}
