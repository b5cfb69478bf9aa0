//! Application Events
//!
//! Cross-cutting notifications (a playlist changed, sync finished, the user
//! signed out) go through an injected [`EventDispatcher`] instead of ambient
//! global state. Listeners are registered when a consumer mounts and must be
//! deregistered when it is torn down.

use crate::types::{SyncState, SyncTable};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

/// Events emitted by the sync core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppEvent {
    /// The projected playlist list changed
    PlaylistsUpdated {
        /// Number of visible playlists after the change
        count: usize,
    },

    /// The projected favorites list changed
    FavoritesUpdated { count: usize },

    /// The projected play history changed
    PlayHistoryUpdated { count: usize },

    /// The set of disliked songs changed
    DislikesUpdated { count: usize },

    /// Sync engine moved to a new state
    SyncStateChanged { state: SyncState },

    /// A sync cycle finished
    SyncCompleted {
        /// Tables whose cycle failed
        failed_tables: Vec<SyncTable>,
        /// Rows written from remote
        applied: usize,
        /// Rows acknowledged by remote
        pushed: usize,
    },

    /// Signed in or out
    SessionChanged { user_id: Option<String> },
}

/// Handle returned by [`EventDispatcher::register`]
pub type ListenerId = u64;

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    next_id: ListenerId,
    listeners: Vec<(ListenerId, Listener<E>)>,
}

/// Typed publish/subscribe registry
///
/// Delivery is synchronous and in registration order. Listeners may register
/// or deregister from inside a callback; the change applies to the next emit.
pub struct EventDispatcher<E> {
    inner: Arc<Mutex<Registry<E>>>,
}

impl<E> Clone for EventDispatcher<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> EventDispatcher<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 1,
                listeners: Vec::new(),
            })),
        }
    }

    /// Register a listener, returning the id needed to deregister it
    pub fn register<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut registry = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener; returns false if it was not registered
    pub fn deregister(&self, id: ListenerId) -> bool {
        let mut registry = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let before = registry.listeners.len();
        registry.listeners.retain(|(listener_id, _)| *listener_id != id);
        registry.listeners.len() != before
    }

    /// Deliver an event to every registered listener
    pub fn emit(&self, event: &E) {
        let listeners: Vec<Listener<E>> = {
            let registry = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            registry.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };

        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .len()
    }
}

impl<E> Default for EventDispatcher<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn registered_listener_receives_events() {
        let dispatcher = EventDispatcher::<AppEvent>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        dispatcher.register(move |event| sink.lock().unwrap().push(event.clone()));

        dispatcher.emit(&AppEvent::FavoritesUpdated { count: 3 });

        assert_eq!(
            *seen.lock().unwrap(),
            vec![AppEvent::FavoritesUpdated { count: 3 }]
        );
    }

    #[test]
    fn deregistered_listener_stops_receiving() {
        let dispatcher = EventDispatcher::<AppEvent>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let id = dispatcher.register(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.emit(&AppEvent::PlaylistsUpdated { count: 1 });
        assert!(dispatcher.deregister(id));
        assert!(!dispatcher.deregister(id));
        dispatcher.emit(&AppEvent::PlaylistsUpdated { count: 2 });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.listener_count(), 0);
    }

    #[test]
    fn listener_can_deregister_itself_during_emit() {
        let dispatcher = EventDispatcher::<AppEvent>::new();
        let id_slot = Arc::new(Mutex::new(None::<ListenerId>));

        let inner = dispatcher.clone();
        let slot = Arc::clone(&id_slot);
        let id = dispatcher.register(move |_| {
            if let Some(id) = *slot.lock().unwrap() {
                inner.deregister(id);
            }
        });
        *id_slot.lock().unwrap() = Some(id);

        dispatcher.emit(&AppEvent::SessionChanged { user_id: None });
        assert_eq!(dispatcher.listener_count(), 0);
    }
}
