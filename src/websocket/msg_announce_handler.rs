use tracing::info;

use crate::broadcast::GLOBAL_ROOM;
use crate::error::RealtimeError;
use crate::models::SendMessage;
use crate::presence::org_room;
use crate::websocket::connctx::ConnCtx;
use crate::AppState;

const MAX_ANNOUNCEMENT_CHARS: usize = 2000;

/// Handle announce: admins and owners address their organization, or
/// everyone when they have none.
pub async fn handle_announce(
    state: &AppState,
    ctx: &ConnCtx,
    message: String,
) -> Result<(), RealtimeError> {
    if !ctx.identity.can_announce() {
        return Err(RealtimeError::Authorization(format!(
            "Role '{}' cannot send announcements",
            ctx.identity.role
        )));
    }
    let message = message.trim().to_string();
    if message.is_empty() || message.chars().count() > MAX_ANNOUNCEMENT_CHARS {
        return Err(RealtimeError::Validation(format!(
            "Announcements must be 1 to {} characters",
            MAX_ANNOUNCEMENT_CHARS
        )));
    }

    let room = ctx
        .identity
        .org_id
        .as_deref()
        .map_or_else(|| GLOBAL_ROOM.to_string(), org_room);
    info!("Announcement from {} to {}", ctx.user_id(), room);

    state
        .bridge
        .send_to_room(
            &room,
            SendMessage::AnnouncementBroadcast {
                organization_id: ctx.identity.org_id.clone(),
                user_id: ctx.user_id().to_string(),
                display_name: ctx.identity.display_name.clone(),
                message,
            },
            None,
        )
        .await;
    Ok(())
}
