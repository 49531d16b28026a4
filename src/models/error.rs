use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of every non-2xx HTTP answer, and of a rejected websocket handshake
#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub code: u16,
    pub status: String,
    pub error: String,
}
