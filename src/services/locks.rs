// src/services/locks.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Entries with no holders are dropped once the map grows past this.
const PRUNE_THRESHOLD: usize = 1024;

/// One async mutex per id (an assessment id or a user id, depending on the
/// owner). Holding the guard makes the holder the only writer of that key
/// within this process.
#[derive(Default)]
pub(crate) struct KeyedLocks {
    inner: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub(crate) async fn acquire(&self, key: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if map.len() > PRUNE_THRESHOLD {
                map.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            map.entry(key).or_default().clone()
        };
        lock.lock_owned().await
    }
}
