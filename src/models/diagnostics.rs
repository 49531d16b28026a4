use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response for diagnostics information
#[derive(Serialize, Deserialize, ToSchema)]
pub struct DiagnosticsResponse {
    pub instance_id: String,
    pub n_conn: u32,
    pub n_sockets: u32,
    pub n_users: u32,
    pub n_rooms: u32,
    pub n_doc_rooms: u32,
    pub n_sessions: u32,
    pub n_locks: u32,
    pub n_cursors: u32,
    pub n_typing: u32,
    pub n_rate_counters: u32,
    pub n_identities: u32,
    pub cpu_usage: f32,
    pub memory_alloc: u64,
    pub memory_total: u64,
    pub memory_free: u64,
}
