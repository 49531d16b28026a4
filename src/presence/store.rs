use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use crate::error::StoreError;
use crate::models::PresenceRecord;
use crate::utils::sync::{read, write};

/// Repository for the persisted presence record, the system of record for
/// "last known state".
pub trait PresenceStore: Send + Sync {
    fn find<'a>(&'a self, user_id: &'a str)
        -> BoxFuture<'a, Result<Option<PresenceRecord>, StoreError>>;

    fn create<'a>(&'a self, record: &'a PresenceRecord) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Returns false when no record exists for the user.
    fn update<'a>(&'a self, record: &'a PresenceRecord) -> BoxFuture<'a, Result<bool, StoreError>>;
}

/// Process-local store, used when no database is configured.
#[derive(Default)]
pub struct MemoryPresenceStore {
    records: RwLock<HashMap<String, PresenceRecord>>,
    failing: AtomicBool,
}

impl MemoryPresenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn snapshot(&self, user_id: &str) -> Option<PresenceRecord> {
        read(&self.records).get(user_id).cloned()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is failing".to_string()));
        }
        Ok(())
    }
}

impl PresenceStore for MemoryPresenceStore {
    fn find<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<PresenceRecord>, StoreError>> {
        Box::pin(async move {
            self.check()?;
            Ok(read(&self.records).get(user_id).cloned())
        })
    }

    fn create<'a>(&'a self, record: &'a PresenceRecord) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            self.check()?;
            write(&self.records).insert(record.user_id.clone(), record.clone());
            Ok(())
        })
    }

    fn update<'a>(&'a self, record: &'a PresenceRecord) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(async move {
            self.check()?;
            let mut records = write(&self.records);
            match records.get_mut(&record.user_id) {
                Some(existing) => {
                    *existing = record.clone();
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }
}
