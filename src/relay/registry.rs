//! Session id -> in-flight relay bookkeeping

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::CollisionPolicy;

/// Cancellation handle for one running relay
///
/// The flag only ever goes from `false` to `true`.
#[derive(Debug, Default)]
pub struct RelayHandle {
    cancelled: AtomicBool,
}

impl RelayHandle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Session '{0}' already has an active generation")]
    SessionBusy(String),
}

/// Active relays keyed by the client-supplied session id
#[derive(Debug, Default)]
pub struct SessionRegistry {
    relays: Mutex<HashMap<String, Arc<RelayHandle>>>,
    policy: CollisionPolicy,
}

impl SessionRegistry {
    pub fn new(policy: CollisionPolicy) -> Self {
        Self {
            relays: Mutex::new(HashMap::new()),
            policy,
        }
    }

    pub fn policy(&self) -> CollisionPolicy {
        self.policy
    }

    fn relays(&self) -> MutexGuard<'_, HashMap<String, Arc<RelayHandle>>> {
        // Every critical section is a single map operation, so a poisoned map is still consistent
        self.relays.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite; returns the displaced handle
    pub fn register(&self, session_id: &str, handle: Arc<RelayHandle>) -> Option<Arc<RelayHandle>> {
        self.relays().insert(session_id.to_string(), handle)
    }

    /// Register according to the collision policy
    pub fn try_register(&self, session_id: &str, handle: Arc<RelayHandle>) -> Result<(), RegistryError> {
        let mut relays = self.relays();
        match self.policy {
            CollisionPolicy::Reject if relays.contains_key(session_id) => {
                Err(RegistryError::SessionBusy(session_id.to_string()))
            }
            _ => {
                if relays.insert(session_id.to_string(), handle).is_some() {
                    tracing::warn!(session_id = %session_id, "Session id reused, replacing active relay");
                }
                Ok(())
            }
        }
    }

    /// Flag the relay for cancellation and drop its entry
    pub fn cancel(&self, session_id: &str) -> bool {
        match self.relays().remove(session_id) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every active relay; used at shutdown
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.relays().drain().collect();
        for (_, handle) in &drained {
            handle.cancel();
        }
        drained.len()
    }

    pub fn remove(&self, session_id: &str) {
        self.relays().remove(session_id);
    }

    /// Remove the entry only if it still points at `handle`
    pub fn remove_if_current(&self, session_id: &str, handle: &Arc<RelayHandle>) -> bool {
        let mut relays = self.relays();
        match relays.get(session_id) {
            Some(current) if Arc::ptr_eq(current, handle) => {
                relays.remove(session_id);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.relays().contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.relays().len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays().is_empty()
    }
}
