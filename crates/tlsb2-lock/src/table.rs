use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::debug;

use crate::error::{LockError, LockResult};

/// Handle returned to a caller that found a name already locked.
///
/// Every waiter for a name observes the same release signal. Waiting does not
/// acquire the lock: once [`Waiter::wait`] returns, call
/// [`LocalLockTable::try_lock`] again. Dropping the future returned by
/// `wait` cancels the wait.
#[derive(Debug)]
pub struct Waiter {
    name: String,
    released: watch::Receiver<bool>,
}

impl Waiter {
    /// Name of the lock being waited on.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if the holder has already released the lock.
    pub fn is_released(&self) -> bool {
        *self.released.borrow() || self.released.has_changed().is_err()
    }

    /// Wait until the current holder releases the lock.
    pub async fn wait(mut self) {
        // A closed channel means the entry was dropped: released as well.
        let _ = self.released.wait_for(|released| *released).await;
    }
}

/// Named mutual exclusion, scoped to this table and this process.
///
/// An entry exists for a name exactly while it is locked. The internal mutex
/// is held only to mutate the map, never for the duration of a hold.
#[derive(Debug, Default)]
pub struct LocalLockTable {
    entries: Mutex<HashMap<String, watch::Sender<bool>>>,
}

impl LocalLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> LockResult<MutexGuard<'_, HashMap<String, watch::Sender<bool>>>> {
        self.entries
            .lock()
            .map_err(|e| LockError::Poisoned(e.to_string()))
    }

    /// Try to take the lock for `name`.
    ///
    /// Returns `Ok(None)` when the caller now holds the lock, or
    /// `Ok(Some(waiter))` when someone else holds it.
    pub fn try_lock(&self, name: &str) -> LockResult<Option<Waiter>> {
        let mut entries = self.entries()?;
        if let Some(sender) = entries.get(name) {
            debug!(name, "lock busy");
            return Ok(Some(Waiter {
                name: name.to_string(),
                released: sender.subscribe(),
            }));
        }
        let (sender, _) = watch::channel(false);
        entries.insert(name.to_string(), sender);
        debug!(name, "lock acquired");
        Ok(None)
    }

    /// Release the lock for `name` and wake its waiters.
    ///
    /// Unlocking a name that is not locked is a no-op.
    pub fn unlock(&self, name: &str) -> LockResult<()> {
        let removed = self.entries()?.remove(name);
        if let Some(sender) = removed {
            sender.send_replace(true);
            debug!(name, "lock released");
        }
        Ok(())
    }

    /// Take the lock for `name`, waiting for other holders as needed.
    pub async fn lock(&self, name: &str) -> LockResult<()> {
        loop {
            match self.try_lock(name)? {
                None => return Ok(()),
                Some(waiter) => waiter.wait().await,
            }
        }
    }

    /// Returns `true` if `name` is currently locked.
    pub fn is_locked(&self, name: &str) -> LockResult<bool> {
        Ok(self.entries()?.contains_key(name))
    }

    /// Number of names currently locked.
    pub fn len(&self) -> LockResult<usize> {
        Ok(self.entries()?.len())
    }

    pub fn is_empty(&self) -> LockResult<bool> {
        Ok(self.len()? == 0)
    }
}
