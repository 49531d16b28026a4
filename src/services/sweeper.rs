use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::collab::ExpiredSession;
use crate::models::SendMessage;
use crate::websocket::msg_session_handler::broadcast_released_state;
use crate::AppState;

/// Spawn the presence, session and rate limit sweeps.
pub fn spawn_sweepers(state: Arc<AppState>) -> Vec<JoinHandle<()>> {
    let config = &state.config;
    let presence_every = Duration::from_secs(config.presence_sweep_interval_secs.max(1));
    let sessions_every = Duration::from_secs(config.session_sweep_interval_secs.max(1));
    let purge_every = Duration::from_secs(config.rate_limit_purge_interval_secs.max(1));
    info!(
        "Sweeps every {:?} (presence), {:?} (sessions), {:?} (rate limits)",
        presence_every, sessions_every, purge_every
    );

    vec![
        spawn_every(state.clone(), presence_every, |state| async move {
            sweep_presence(&state).await;
        }),
        spawn_every(state.clone(), sessions_every, |state| async move {
            sweep_sessions(&state).await;
        }),
        spawn_every(state, purge_every, |state| async move {
            sweep_rate_limits(&state);
        }),
    ]
}

fn spawn_every<F, Fut>(state: Arc<AppState>, period: Duration, sweep: F) -> JoinHandle<()>
where
    F: Fn(Arc<AppState>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep(state.clone()).await;
        }
    })
}

pub async fn sweep_presence(state: &AppState) -> Vec<String> {
    state
        .presence
        .cleanup_inactive_presences(state.config.presence_offline_threshold())
        .await
}

/// Expire idle sessions and tell their document rooms, including the locks
/// and typing flags their participants lost.
pub async fn sweep_sessions(state: &AppState) -> usize {
    let expired = state
        .sessions
        .sweep_inactive_sessions(state.config.session_inactivity());
    notify_expired(state, &expired).await;
    expired.len()
}

async fn notify_expired(state: &AppState, expired: &[ExpiredSession]) {
    for session in expired {
        state
            .bridge
            .send_to_document(
                &session.document_id,
                SendMessage::SessionExpired {
                    document_id: session.document_id.clone(),
                    session_id: session.session_id,
                },
                None,
            )
            .await;
        for released in &session.released {
            broadcast_released_state(
                state,
                &session.document_id,
                &released.user_id,
                &released.released_locks,
                released.was_typing,
            )
            .await;
        }
    }
}

pub fn sweep_rate_limits(state: &AppState) -> usize {
    let purged = state.rate_limiter.purge_expired();
    if purged > 0 {
        debug!("Purged {} expired rate limit counters", purged);
    }
    purged
}
