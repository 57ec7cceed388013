// Change notification: observers keyed by locator, signaled after mutations

use crate::locator::Locator;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;

/// What happened at the notified locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Inserted,
    Updated,
    Deleted,
}

/// A change signal delivered to an observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub locator: Locator,
    pub kind: ChangeKind,
}

struct Observer {
    locator: Locator,
    descendants: bool,
    /// Holds at most one pending signal; observers re-read, they do not replay.
    tx: mpsc::SyncSender<ChangeEvent>,
}

impl Observer {
    /// A change at `changed` concerns this observer when it is the same
    /// locator, an ancestor of it, or (for descendant observers) below it.
    fn matches(&self, changed: &Locator) -> bool {
        self.locator == *changed
            || changed.is_ancestor_of(&self.locator)
            || (self.descendants && self.locator.is_ancestor_of(changed))
    }
}

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    observers: RwLock<HashMap<u64, Observer>>,
}

impl Registry {
    fn remove(&self, id: u64) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

/// Fan-out of change signals to every interested observer.
///
/// Cloning the bus shares the registry.
#[derive(Clone, Default)]
pub struct NotificationBus {
    registry: Arc<Registry>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `locator`. With `descendants`, changes anywhere
    /// below it are delivered too. Dropping the subscription unregisters it.
    pub fn subscribe(&self, locator: Locator, descendants: bool) -> Subscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::sync_channel(1);
        self.registry
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                Observer {
                    locator: locator.clone(),
                    descendants,
                    tx,
                },
            );
        log::debug!("observer {id} subscribed to {locator}");
        Subscription {
            id,
            locator,
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Signal the observers of every locator in `changed`. An observer that
    /// matches several of them is signaled once, with the first match. An
    /// observer that still has an unread signal keeps that one. Returns how
    /// many observers were signaled.
    pub fn notify(&self, changed: &[Locator], kind: ChangeKind) -> usize {
        let mut dead = Vec::new();
        let mut signaled = 0;
        {
            let observers = self
                .registry
                .observers
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            for (id, observer) in observers.iter() {
                let Some(locator) = changed.iter().find(|l| observer.matches(l)) else {
                    continue;
                };
                let event = ChangeEvent {
                    locator: locator.clone(),
                    kind,
                };
                match observer.tx.try_send(event) {
                    Ok(()) | Err(mpsc::TrySendError::Full(_)) => signaled += 1,
                    Err(mpsc::TrySendError::Disconnected(_)) => dead.push(*id),
                }
            }
        }
        for id in dead {
            log::warn!("dropping observer {id}: receiver gone");
            self.registry.remove(id);
        }
        signaled
    }

    pub fn observer_count(&self) -> usize {
        self.registry
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// A registered observer. Receives [`ChangeEvent`]s until dropped.
pub struct Subscription {
    id: u64,
    locator: Locator,
    rx: mpsc::Receiver<ChangeEvent>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn try_recv(&self) -> Option<ChangeEvent> {
        self.rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<ChangeEvent> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// The pending signal, if any, as a list.
    pub fn drain(&self) -> Vec<ChangeEvent> {
        self.rx.try_iter().collect()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("locator", &self.locator)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AUTHORITY;

    #[test]
    fn test_exact_match() {
        let bus = NotificationBus::new();
        let sub = bus.subscribe(Locator::notes(AUTHORITY), false);
        assert_eq!(bus.notify(&[Locator::notes(AUTHORITY)], ChangeKind::Inserted), 1);
        let events = sub.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::Inserted);
    }

    #[test]
    fn test_descendant_delivery() {
        let bus = NotificationBus::new();
        let shallow = bus.subscribe(Locator::notes(AUTHORITY), false);
        let deep = bus.subscribe(Locator::notes(AUTHORITY), true);

        bus.notify(&[Locator::note(AUTHORITY, 3)], ChangeKind::Updated);
        assert!(shallow.try_recv().is_none());
        assert_eq!(
            deep.try_recv().map(|e| e.locator),
            Some(Locator::note(AUTHORITY, 3))
        );
    }

    #[test]
    fn test_collection_change_reaches_item_observers() {
        let bus = NotificationBus::new();
        let item = bus.subscribe(Locator::note(AUTHORITY, 3), false);
        bus.notify(&[Locator::notes(AUTHORITY)], ChangeKind::Deleted);
        assert!(item.try_recv().is_some());
    }

    #[test]
    fn test_signaled_once_per_notify() {
        let bus = NotificationBus::new();
        let sub = bus.subscribe(Locator::notes(AUTHORITY), true);
        let signaled = bus.notify(
            &[
                Locator::note(AUTHORITY, 1),
                Locator::notes(AUTHORITY),
                Locator::live_folder(AUTHORITY),
            ],
            ChangeKind::Updated,
        );
        assert_eq!(signaled, 1);
        assert_eq!(sub.drain().len(), 1);
    }

    #[test]
    fn test_unrelated_locator_is_ignored() {
        let bus = NotificationBus::new();
        let sub = bus.subscribe(Locator::live_folder(AUTHORITY), false);
        assert_eq!(bus.notify(&[Locator::notes("other.authority")], ChangeKind::Inserted), 0);
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_unread_signals_do_not_pile_up() {
        let bus = NotificationBus::new();
        let sub = bus.subscribe(Locator::notes(AUTHORITY), true);
        for id in 0..100 {
            assert_eq!(bus.notify(&[Locator::note(AUTHORITY, id)], ChangeKind::Updated), 1);
        }
        let events = sub.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].locator, Locator::note(AUTHORITY, 0));

        bus.notify(&[Locator::notes(AUTHORITY)], ChangeKind::Deleted);
        assert_eq!(sub.try_recv().map(|e| e.kind), Some(ChangeKind::Deleted));
    }

    #[test]
    fn test_drop_unregisters() {
        let bus = NotificationBus::new();
        let sub = bus.subscribe(Locator::notes(AUTHORITY), false);
        assert_eq!(bus.observer_count(), 1);
        drop(sub);
        assert_eq!(bus.observer_count(), 0);
        assert_eq!(bus.notify(&[Locator::notes(AUTHORITY)], ChangeKind::Inserted), 0);
    }
}
