// Routing of inbound messages to handlers registered per address
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use osc_core::OscMessage;
use parking_lot::Mutex;

pub type Handler = Arc<dyn Fn(&OscMessage) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Exact-match address -> handlers map. Addresses never stay registered
/// with an empty handler list.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: Mutex<HashMap<String, Vec<(SubscriptionId, Handler)>>>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, address: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&OscMessage) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .lock()
            .entry(address.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Subscribe for as long as the returned guard lives.
    pub fn scoped<F>(&self, address: &str, handler: F) -> ScopedSubscription<'_>
    where
        F: Fn(&OscMessage) + Send + Sync + 'static,
    {
        let id = self.subscribe(address, handler);
        ScopedSubscription {
            registry: self,
            address: address.to_string(),
            id,
        }
    }

    /// Remove subscriptions, returning how many handlers were dropped.
    ///
    /// * neither given: everything
    /// * address only: every handler for that address
    /// * both: exactly that handler
    /// * id only: that handler, wherever it is registered
    pub fn unsubscribe(&self, address: Option<&str>, id: Option<SubscriptionId>) -> usize {
        let mut entries = self.entries.lock();

        match (address, id) {
            (None, None) => {
                let removed = entries.values().map(Vec::len).sum();
                entries.clear();
                removed
            }
            (Some(address), None) => entries.remove(address).map_or(0, |handlers| handlers.len()),
            (Some(address), Some(id)) => {
                let Some(handlers) = entries.get_mut(address) else {
                    return 0;
                };
                let before = handlers.len();
                handlers.retain(|(h, _)| *h != id);
                let removed = before - handlers.len();
                if handlers.is_empty() {
                    entries.remove(address);
                }
                removed
            }
            (None, Some(id)) => {
                let mut removed = 0;
                entries.retain(|_, handlers| {
                    let before = handlers.len();
                    handlers.retain(|(h, _)| *h != id);
                    removed += before - handlers.len();
                    !handlers.is_empty()
                });
                removed
            }
        }
    }

    /// Invoke every handler registered for `message.address`. Returns
    /// false when there were none, in which case the caller renders the
    /// message itself.
    pub fn dispatch(&self, message: &OscMessage) -> bool {
        // Handlers run unlocked so they may (un)subscribe themselves
        let handlers: Vec<(SubscriptionId, Handler)> = match self.entries.lock().get(&message.address) {
            Some(handlers) => handlers.iter().map(|(id, h)| (*id, Arc::clone(h))).collect(),
            None => return false,
        };

        for (id, handler) in &handlers {
            // Skip handlers unsubscribed since the snapshot
            if self.is_registered(&message.address, *id) {
                handler(message);
            }
        }
        true
    }

    fn is_registered(&self, address: &str, id: SubscriptionId) -> bool {
        self.entries
            .lock()
            .get(address)
            .is_some_and(|handlers| handlers.iter().any(|(h, _)| *h == id))
    }

    pub fn contains(&self, address: &str) -> bool {
        self.entries.lock().contains_key(address)
    }

    /// Number of addresses with at least one handler.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn handler_count(&self, address: &str) -> usize {
        self.entries.lock().get(address).map_or(0, Vec::len)
    }

    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.entries.lock().keys().cloned().collect();
        addresses.sort();
        addresses
    }
}

/// Unsubscribes on drop.
pub struct ScopedSubscription<'a> {
    registry: &'a SubscriptionRegistry,
    address: String,
    id: SubscriptionId,
}

impl ScopedSubscription<'_> {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

impl Drop for ScopedSubscription<'_> {
    fn drop(&mut self) {
        self.registry.unsubscribe(Some(&self.address), Some(self.id));
    }
}
