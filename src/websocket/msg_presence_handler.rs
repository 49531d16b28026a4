use chrono::Utc;
use tracing::debug;

use crate::error::RealtimeError;
use crate::models::{ActivityType, PresenceStatus, SendMessage};
use crate::websocket::connctx::ConnCtx;
use crate::AppState;

/// Handle update-status
pub async fn handle_update_status(
    state: &AppState,
    ctx: &ConnCtx,
    status: PresenceStatus,
) -> Result<(), RealtimeError> {
    state.presence.update_status(ctx.user_id(), status).await?;
    Ok(())
}

/// Handle update-activity
pub async fn handle_update_activity(
    state: &AppState,
    ctx: &ConnCtx,
    activity: ActivityType,
    context: Option<String>,
) -> Result<(), RealtimeError> {
    let context = context.filter(|c| !c.trim().is_empty());
    state.presence.update_activity(ctx.user_id(), activity, context).await;
    Ok(())
}

/// Handle ping: heartbeat plus pong.
pub fn handle_ping(state: &AppState, ctx: &ConnCtx) -> Result<(), RealtimeError> {
    debug!("Ping from connection {}", ctx.connection_id);
    state.presence.touch(ctx.user_id());
    let pong = SendMessage::Pong {
        date: Utc::now().to_rfc3339(),
    };
    if !state.bridge.send_to_connection(ctx.connection_id, &pong) {
        return Err(RealtimeError::Transport(format!(
            "Connection {} is gone",
            ctx.connection_id
        )));
    }
    Ok(())
}
