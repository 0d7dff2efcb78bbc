use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::{PlakarError, Result};
use crate::storage::{BlobKind, BlobStore};

/// Wall-clock age after which a lock is considered abandoned.
pub const LOCK_TTL_SECS: i64 = 15 * 60;

/// Advisory lock blob, stored as plain JSON under `locks/<uuid>` so it can
/// be inspected and reaped without a passphrase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lock {
    pub hostname: String,
    pub username: String,
    pub machine_id: String,
    pub pid: u32,
    pub exclusive: bool,
    pub timestamp: DateTime<Utc>,
}

impl Lock {
    pub fn new(ctx: &AppContext, exclusive: bool) -> Self {
        Self {
            hostname: ctx.hostname.clone(),
            username: ctx.username.clone(),
            machine_id: ctx.machine_id.clone(),
            pid: std::process::id(),
            exclusive,
            timestamp: Utc::now(),
        }
    }

    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.timestamp) > Duration::seconds(LOCK_TTL_SECS)
    }
}

/// Handle to an acquired lock; pass back to `release`.
#[derive(Debug)]
pub struct LockHandle {
    id: String,
    exclusive: bool,
}

impl LockHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }
}

/// Acquire a shared (push) or exclusive (cleanup) lock.
///
/// The lock blob is written first, then all other locks are listed: a shared
/// acquisition fails on any unexpired foreign exclusive lock, an exclusive
/// acquisition fails on any unexpired foreign lock. On conflict the fresh
/// lock is removed before returning `Busy`.
pub fn acquire(storage: &dyn BlobStore, ctx: &AppContext, exclusive: bool) -> Result<LockHandle> {
    let id = Uuid::new_v4().to_string();
    let lock = Lock::new(ctx, exclusive);
    let data = serde_json::to_vec(&lock)
        .map_err(|e| PlakarError::Other(format!("lock serialize: {e}")))?;
    storage.put_blob(BlobKind::Lock, &id, &data)?;

    let now = Utc::now();
    for other_id in storage.list_blobs(BlobKind::Lock)? {
        if other_id == id {
            continue;
        }
        let Some(raw) = storage.get_blob(BlobKind::Lock, &other_id)? else {
            continue;
        };
        let Ok(other) = serde_json::from_slice::<Lock>(&raw) else {
            warn!(lock = %other_id, "ignoring unparsable lock blob");
            continue;
        };
        if other.expired(now) {
            debug!(lock = %other_id, "reaping expired lock");
            let _ = storage.delete_blob(BlobKind::Lock, &other_id);
            continue;
        }
        if exclusive || other.exclusive {
            let _ = storage.delete_blob(BlobKind::Lock, &id);
            return Err(PlakarError::Busy(format!(
                "{}@{} (pid {}) has ongoing operations",
                other.username, other.hostname, other.pid
            )));
        }
    }

    debug!(lock = %id, exclusive, "acquired repository lock");
    Ok(LockHandle { id, exclusive })
}

/// Release a previously acquired lock.
pub fn release(storage: &dyn BlobStore, handle: LockHandle) -> Result<()> {
    debug!(lock = %handle.id, "releasing repository lock");
    storage.delete_blob(BlobKind::Lock, &handle.id)
}
