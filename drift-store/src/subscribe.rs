//! Change subscriptions: per-id listener sets plus one wildcard set.
//!
//! Listeners are invoked synchronously, on the task that performed the
//! write, after persistence and before the write returns. The registry is
//! snapshotted before each notification pass, so unsubscribing mid-pass
//! never affects delivery to the other listeners of that pass.

use drift_types::Record;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A change listener. Receives the record id and the new winning record,
/// or `None` when the winner is a tombstone.
pub type Listener = Arc<dyn Fn(&str, Option<&Record>) + Send + Sync>;

#[derive(Default)]
struct HubInner {
    next_token: u64,
    by_id: HashMap<String, Vec<(u64, Listener)>>,
    wildcard: Vec<(u64, Listener)>,
}

/// Listener registry for a single store instance.
#[derive(Clone, Default)]
pub struct SubscriptionHub {
    inner: Arc<Mutex<HubInner>>,
}

impl SubscriptionHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for one record id.
    pub fn on(
        &self,
        id: impl Into<String>,
        listener: impl Fn(&str, Option<&Record>) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe(Some(id.into()), Arc::new(listener))
    }

    /// Register a wildcard listener invoked for every id.
    pub fn on_any(
        &self,
        listener: impl Fn(&str, Option<&Record>) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe(None, Arc::new(listener))
    }

    fn subscribe(&self, key: Option<String>, listener: Listener) -> Subscription {
        let mut inner = self.inner.lock().unwrap();
        let token = inner.next_token;
        inner.next_token += 1;

        match &key {
            Some(id) => inner
                .by_id
                .entry(id.clone())
                .or_default()
                .push((token, listener)),
            None => inner.wildcard.push((token, listener)),
        }

        Subscription {
            inner: Arc::clone(&self.inner),
            key,
            token,
        }
    }

    /// Deliver a change to every listener registered for `id`, then to the
    /// wildcard set. The listener list is snapshotted before iterating.
    pub fn notify(&self, id: &str, record: Option<&Record>) {
        let listeners: Vec<Listener> = {
            let inner = self.inner.lock().unwrap();
            inner
                .by_id
                .get(id)
                .into_iter()
                .flatten()
                .chain(inner.wildcard.iter())
                .map(|(_, l)| Arc::clone(l))
                .collect()
        };

        for listener in listeners {
            listener(id, record);
        }
    }

    /// Total number of registered listeners.
    pub fn listener_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.by_id.values().map(Vec::len).sum::<usize>() + inner.wildcard.len()
    }
}

/// Handle for one registered listener. Dropping the handle keeps the
/// listener alive; removal is explicit via [`Subscription::unsubscribe`].
pub struct Subscription {
    inner: Arc<Mutex<HubInner>>,
    key: Option<String>,
    token: u64,
}

impl Subscription {
    /// Remove the listener this handle refers to.
    pub fn unsubscribe(self) {
        let mut inner = self.inner.lock().unwrap();
        match &self.key {
            Some(id) => {
                if let Some(listeners) = inner.by_id.get_mut(id) {
                    listeners.retain(|(token, _)| *token != self.token);
                    if listeners.is_empty() {
                        inner.by_id.remove(id);
                    }
                }
            }
            None => inner.wildcard.retain(|(token, _)| *token != self.token),
        }
    }
}
