use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::{MatchId, TeamId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKey {
    Team(TeamId),
    Match(MatchId),
}

/// One async mutex per external ID. Writers for the same ID queue up,
/// writers for different IDs never touch each other's lock.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: LockKey) -> KeyGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock();
            slots.entry(key).or_default().clone()
        };
        let guard = slot.lock_owned().await;
        KeyGuard {
            owner: self,
            key,
            guard: Some(guard),
        }
    }

    fn release(&self, key: LockKey) {
        let mut slots = self.slots.lock();
        // Only the map itself still holds the slot: nobody is waiting on it.
        if slots.get(&key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            slots.remove(&key);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.lock().len()
    }
}

pub struct KeyGuard<'a> {
    owner: &'a KeyedLocks,
    key: LockKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        // Drop the owned guard first so its Arc no longer counts.
        self.guard.take();
        self.owner.release(self.key);
    }
}
