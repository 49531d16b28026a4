use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::models::PresenceRecord;
use crate::presence::store::PresenceStore;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS user_presence (
    user_id          TEXT PRIMARY KEY,
    status           TEXT NOT NULL,
    current_activity TEXT NOT NULL,
    activity_context TEXT,
    last_seen        TIMESTAMPTZ NOT NULL,
    metadata         JSONB NOT NULL DEFAULT '{}'::jsonb
)"#;

/// Presence row as stored in Postgres
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PresenceRow {
    pub user_id: String,
    pub status: String,
    pub current_activity: String,
    pub activity_context: Option<String>,
    pub last_seen: DateTime<Utc>,
    pub metadata: Json<HashMap<String, serde_json::Value>>,
}

impl TryFrom<PresenceRow> for PresenceRecord {
    type Error = StoreError;

    fn try_from(row: PresenceRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StoreError::CorruptRow {
            user_id: row.user_id.clone(),
            reason,
        };
        let status = row.status.parse().map_err(corrupt)?;
        let current_activity = row.current_activity.parse().map_err(corrupt)?;
        Ok(PresenceRecord {
            user_id: row.user_id.clone(),
            status,
            current_activity,
            activity_context: row.activity_context,
            last_seen: row.last_seen,
            metadata: row.metadata.0,
        })
    }
}

/// Presence records in the `user_presence` table.
pub struct PgPresenceStore {
    pool: PgPool,
}

impl PgPresenceStore {
    /// Connect and make sure the table exists.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        info!("Table user_presence is ready");
        Ok(())
    }

    async fn find_row(&self, user_id: &str) -> Result<Option<PresenceRecord>, StoreError> {
        let row = sqlx::query_as::<_, PresenceRow>(
            "SELECT user_id, status, current_activity, activity_context, last_seen, metadata \
             FROM user_presence WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PresenceRecord::try_from).transpose()
    }

    async fn insert_row(&self, record: &PresenceRecord) -> Result<(), StoreError> {
        // Two instances may race on a user's first connection.
        sqlx::query(
            "INSERT INTO user_presence \
             (user_id, status, current_activity, activity_context, last_seen, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (user_id) DO UPDATE SET \
             status = EXCLUDED.status, current_activity = EXCLUDED.current_activity, \
             activity_context = EXCLUDED.activity_context, last_seen = EXCLUDED.last_seen, \
             metadata = EXCLUDED.metadata",
        )
        .bind(&record.user_id)
        .bind(record.status.as_str())
        .bind(record.current_activity.as_str())
        .bind(&record.activity_context)
        .bind(record.last_seen)
        .bind(Json(&record.metadata))
        .execute(&self.pool)
        .await?;
        debug!("Inserted presence of {}", record.user_id);
        Ok(())
    }

    async fn update_row(&self, record: &PresenceRecord) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE user_presence SET status = $2, current_activity = $3, \
             activity_context = $4, last_seen = $5, metadata = $6 WHERE user_id = $1",
        )
        .bind(&record.user_id)
        .bind(record.status.as_str())
        .bind(record.current_activity.as_str())
        .bind(&record.activity_context)
        .bind(record.last_seen)
        .bind(Json(&record.metadata))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

impl PresenceStore for PgPresenceStore {
    fn find<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<PresenceRecord>, StoreError>> {
        Box::pin(self.find_row(user_id))
    }

    fn create<'a>(&'a self, record: &'a PresenceRecord) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(self.insert_row(record))
    }

    fn update<'a>(&'a self, record: &'a PresenceRecord) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(self.update_row(record))
    }
}
