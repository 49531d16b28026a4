use crate::{auth::auth, models::{DiagnosticsResponse, ErrorResponse}, AppState};
use axum::{extract::{State, Extension}, http::StatusCode, Json};
use std::sync::Arc;
use std::sync::{Mutex, OnceLock};
use sysinfo::System;
use tracing::info;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Report what this instance holds in memory
pub async fn diagnostics(
    State(state): State<Arc<AppState>>,
    Extension(prpls): Extension<Vec<String>>,
) -> Result<(StatusCode, Json<DiagnosticsResponse>), (StatusCode, Json<ErrorResponse>)> {

    let _ = auth::ensure_cloud_admin(&prpls)?;

    let registry = state.registry.stats();
    let sessions = state.sessions.stats();

    // System stats
    let (cpu_usage, memory_alloc, memory_free, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| {
            Mutex::new(System::new_all())
        });
        match sys_lock.lock() {
            Ok(mut sys) => {
                sys.refresh_cpu();
                sys.refresh_memory();
                (
                    sys.global_cpu_info().cpu_usage(),
                    sys.used_memory(),
                    sys.free_memory(),
                    sys.total_memory(),
                )
            }
            Err(_) => (0.0, 0, 0, 0)
        }
    };

    info!(
        "Diagnostics: CPU: {:.2}%, Mem: {}/{} MB (Free: {} MB), Conn: {}, Rooms: {}, Sessions: {}",
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        memory_free / 1024 / 1024,
        registry.connections,
        registry.rooms,
        sessions.sessions
    );

    Ok((
        StatusCode::OK,
        Json(DiagnosticsResponse {
            instance_id: state.bridge.instance_id().to_string(),
            n_conn: registry.connections as u32,
            n_sockets: state.transport.attached_count() as u32,
            n_users: registry.users as u32,
            n_rooms: registry.rooms as u32,
            n_doc_rooms: registry.doc_rooms as u32,
            n_sessions: sessions.sessions as u32,
            n_locks: sessions.locks as u32,
            n_cursors: sessions.cursors as u32,
            n_typing: sessions.typing as u32,
            n_rate_counters: state.rate_limiter.counter_count() as u32,
            n_identities: state.identities.cached_count() as u32,
            cpu_usage,
            memory_alloc,
            memory_total,
            memory_free,
        }),
    ))
}
