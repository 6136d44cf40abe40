//! Per-key async locks whose map entries live only while someone uses them.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

struct Slot {
    lock: Arc<AsyncMutex<()>>,
    users: usize,
}

type Slots<K> = Arc<Mutex<HashMap<K, Slot>>>;

fn lock_slots<K>(slots: &Slots<K>) -> MutexGuard<'_, HashMap<K, Slot>> {
    match slots.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub struct KeyedLocks<K> {
    slots: Slots<K>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self { slots: Arc::new(Mutex::new(HashMap::new())) }
    }
}

impl<K> fmt::Debug for KeyedLocks<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedLocks").field("keys", &lock_slots(&self.slots).len()).finish()
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    /// Waits for the lock on `key`.
    pub async fn acquire(&self, key: &K) -> KeyedGuard<K> {
        let mut handle = self.register(key);
        let lock = handle.lock.clone();
        handle.guard = Some(lock.lock_owned().await);
        handle
    }

    /// Takes the lock on `key` only if nobody holds it.
    pub fn try_acquire(&self, key: &K) -> Option<KeyedGuard<K>> {
        let mut handle = self.register(key);
        handle.guard = Some(handle.lock.clone().try_lock_owned().ok()?);
        Some(handle)
    }

    /// Number of keys currently held or waited on.
    pub fn len(&self) -> usize {
        lock_slots(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn register(&self, key: &K) -> KeyedGuard<K> {
        let mut slots = lock_slots(&self.slots);
        let slot = slots
            .entry(key.clone())
            .or_insert_with(|| Slot { lock: Arc::new(AsyncMutex::new(())), users: 0 });
        slot.users += 1;
        KeyedGuard {
            key: key.clone(),
            lock: slot.lock.clone(),
            guard: None,
            slots: self.slots.clone(),
        }
    }
}

/// Holds the lock on one key. Dropping the last handle for a key removes
/// its map entry, including handles dropped while still waiting.
pub struct KeyedGuard<K: Eq + Hash> {
    key: K,
    lock: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    slots: Slots<K>,
}

impl<K: Eq + Hash> Drop for KeyedGuard<K> {
    fn drop(&mut self) {
        self.guard.take();
        let mut slots = lock_slots(&self.slots);
        let released = match slots.get_mut(&self.key) {
            Some(slot) => {
                slot.users = slot.users.saturating_sub(1);
                slot.users == 0
            }
            None => false,
        };
        if released {
            slots.remove(&self.key);
        }
    }
}
