pub mod connctx;
pub mod dispatch;
pub mod handler;
pub mod lifecycle;
pub mod msg_announce_handler;
pub mod msg_edit_handler;
pub mod msg_presence_handler;
pub mod msg_session_handler;

pub use connctx::ConnCtx;
pub use handler::websocket_handler;
