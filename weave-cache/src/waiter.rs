//! Single-flight waiter registry (spec §5 "a waiter registry deduplicates
//! concurrent loaders for the same key").

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub enum Lease {
    /// This caller is responsible for computing the value and waking
    /// whoever else joined the wait.
    Leader(Arc<Notify>),
    /// Another caller is already computing; wait on this notifier then
    /// re-check the cache.
    Follower(Arc<Notify>),
}

pub struct WaiterRegistry {
    inflight: Mutex<HashMap<String, Arc<Notify>>>,
}

impl WaiterRegistry {
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn acquire(&self, key: &str) -> Lease {
        let mut map = self.inflight.lock().unwrap();
        if let Some(notify) = map.get(key) {
            Lease::Follower(notify.clone())
        } else {
            let notify = Arc::new(Notify::new());
            map.insert(key.to_string(), notify.clone());
            Lease::Leader(notify)
        }
    }

    /// Called only by the leader once its computation lands (success or
    /// failure); wakes every follower and removes the in-flight marker so
    /// the next miss starts a fresh computation.
    pub fn release(&self, key: &str, notify: Arc<Notify>) {
        self.inflight.lock().unwrap().remove(key);
        notify.notify_waiters();
    }
}

impl Default for WaiterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
