#![allow(dead_code)]

use std::sync::Arc;

use colabri_realtime::broadcast::{InProcessPubSub, PubSubTransport};
use colabri_realtime::config::Config;
use colabri_realtime::models::{ConnectionMeta, SendMessage};
use colabri_realtime::presence::MemoryPresenceStore;
use colabri_realtime::services::Identity;
use colabri_realtime::websocket::{dispatch, lifecycle, ConnCtx};
use colabri_realtime::AppState;
use jsonwebtoken::{encode, EncodingKey, Header};
use tokio::sync::mpsc;
use uuid::Uuid;

pub const SECRET: &str = "integration-secret";

pub fn config(instance: &str) -> Config {
    Config {
        cloud_pod: Some(instance.to_string()),
        cloud_auth_jwt_secret: Some(SECRET.to_string()),
        ..Config::default()
    }
}

pub fn instance(config: Config) -> Arc<AppState> {
    let pubsub: Arc<dyn PubSubTransport> = Arc::new(InProcessPubSub::new(64));
    AppState::new(config, Arc::new(MemoryPresenceStore::new()), pubsub)
}

pub fn identity(user: &str, role: &str, org: Option<&str>) -> Identity {
    Identity {
        user_id: user.to_string(),
        display_name: user.to_uppercase(),
        role: role.to_string(),
        org_id: org.map(str::to_string),
        expires_at: None,
    }
}

pub fn token(claims: serde_json::Value) -> String {
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

pub fn exp() -> i64 {
    chrono::Utc::now().timestamp() + 3600
}

/// A connected client without a real socket.
pub struct Client {
    pub ctx: ConnCtx,
    pub rx: mpsc::UnboundedReceiver<String>,
}

impl Client {
    pub async fn connect(state: &AppState, identity: Identity) -> Client {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = ConnCtx::new(Uuid::new_v4(), identity);
        lifecycle::on_connect(state, &ctx, tx, ConnectionMeta::default()).await;
        Client { ctx, rx }
    }

    pub async fn send(&self, state: &AppState, frame: serde_json::Value) {
        dispatch::handle_frame(state, &self.ctx, &frame.to_string()).await;
    }

    pub async fn disconnect(self, state: &AppState) {
        lifecycle::on_disconnect(state, &self.ctx).await;
    }

    pub fn drain(&mut self) -> Vec<SendMessage> {
        let mut out = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            out.push(serde_json::from_str(&frame).unwrap());
        }
        out
    }

    pub async fn next(&mut self) -> SendMessage {
        let frame = tokio::time::timeout(std::time::Duration::from_secs(1), self.rx.recv())
            .await
            .expect("no frame within a second")
            .expect("channel closed");
        serde_json::from_str(&frame).unwrap()
    }
}
