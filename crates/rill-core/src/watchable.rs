#![forbid(unsafe_code)]

//! Generic subscribe/broadcast registry with per-field watcher isolation.
//!
//! [`Watchable<W>`] is the primitive every notifiable Rill component wraps:
//! callers register a [`Watcher`] (a struct of optional callbacks) and the
//! owning component delivers update bundles through [`Watchable::broadcast`].
//! Delivery is filtered per watcher: only the callbacks a watcher declares
//! are invoked, and only for the bundle entries that are present, so
//! watchers are isolated from each other's shape.
//!
//! # Architecture
//!
//! `Watchable<W>` uses `Rc<RefCell<..>>` for single-threaded shared
//! ownership. Registrations are keyed by a monotonically increasing `u64`,
//! so iteration order over the map is registration order. Broadcasting
//! snapshots the current registrations before delivering, which keeps the
//! registry safely mutable from inside watcher callbacks.
//!
//! # Invariants
//!
//! 1. Watchers are notified in registration order.
//! 2. A watcher removed by an earlier callback in the same broadcast is
//!    skipped; a watcher added mid-broadcast joins the next broadcast.
//! 3. No suspension occurs inside a broadcast: every currently-registered
//!    watcher is notified before the call returns.
//! 4. Dropping (or explicitly unsubscribing) a [`Subscription`] removes the
//!    registration before the next broadcast; repeat removal is a no-op.
//!
//! # Failure Modes
//!
//! - **Watcher callback panics**: not caught. A panicking callback is the
//!   caller's bug and propagates out of `broadcast`.
//! - **Registry dropped before the guard**: the [`Subscription`] holds only
//!   a weak reference and becomes inert.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// A caller-supplied set of named callbacks registered against a
/// notifiable component.
///
/// Implementors are plain structs whose fields are `Option`al callbacks,
/// one per event category. `notify` delivers exactly the intersection of
/// the fields present on the watcher and the values present on the bundle:
/// a `None` bundle entry means "do not deliver this event in this
/// broadcast", which is distinct from a present-but-null payload.
///
/// Composite payloads must be handed to callbacks as independent clones so
/// mutation by one watcher cannot leak into another or into the owning
/// component's cache.
pub trait Watcher {
    /// The update bundle type delivered by the owning registry.
    type Updates;

    /// Deliver `updates` to this watcher's present callbacks.
    fn notify(&self, updates: &Self::Updates);
}

struct Registry<W> {
    watchers: BTreeMap<u64, Rc<W>>,
    next_id: u64,
}

/// Generic subscribe/broadcast registry.
///
/// Cloning a `Watchable` creates a new handle to the **same** registry.
/// Components embed one and layer their own `watch`/state semantics on top.
pub struct Watchable<W> {
    inner: Rc<RefCell<Registry<W>>>,
}

impl<W> Clone for Watchable<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<W> Default for Watchable<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> Watchable<W> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Registry {
                watchers: BTreeMap::new(),
                next_id: 0,
            })),
        }
    }

    /// Register `watcher` and return the guard that removes it.
    ///
    /// Ids are minted from a monotonic counter, so they are collision-free
    /// by construction and double as the registration order.
    pub fn watch(&self, watcher: W) -> Subscription
    where
        W: 'static,
    {
        let id = {
            let mut registry = self.inner.borrow_mut();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.watchers.insert(id, Rc::new(watcher));
            id
        };
        tracing::trace!(target: "rill::watchable", id, "watcher registered");
        let registry = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.borrow_mut().watchers.remove(&id);
                tracing::trace!(target: "rill::watchable", id, "watcher removed");
            }
        })
    }

    /// Number of live registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().watchers.len()
    }

    /// Whether no watcher is currently registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().watchers.is_empty()
    }
}

impl<W: Watcher> Watchable<W> {
    /// Deliver `updates` to every currently-registered watcher, in
    /// registration order.
    ///
    /// Intended for the components layered on this registry, not for their
    /// consumers. The registration set is snapshotted up front; each entry
    /// is re-checked against the live map immediately before delivery so a
    /// watcher unsubscribed by an earlier callback is skipped.
    pub fn broadcast(&self, updates: &W::Updates) {
        let snapshot: Vec<(u64, Rc<W>)> = self
            .inner
            .borrow()
            .watchers
            .iter()
            .map(|(id, watcher)| (*id, Rc::clone(watcher)))
            .collect();
        tracing::trace!(target: "rill::watchable", watchers = snapshot.len(), "broadcast");
        for (id, watcher) in snapshot {
            if !self.inner.borrow().watchers.contains_key(&id) {
                continue;
            }
            watcher.notify(updates);
        }
    }
}

impl<W> fmt::Debug for Watchable<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watchable")
            .field("watchers", &self.len())
            .finish()
    }
}

/// Guard for one registration in a [`Watchable`].
///
/// Dropping the guard removes the watcher. [`Subscription::unsubscribe`]
/// does the same explicitly; [`Subscription::forget`] keeps the
/// registration alive for the lifetime of the registry without holding the
/// guard. Removal is idempotent.
#[must_use = "dropping a Subscription unsubscribes the watcher"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Remove the registration now.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Leave the registration alive until the owning registry is dropped.
    pub fn forget(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Probe {
        seen: Option<Box<dyn Fn(i64)>>,
        other: Option<Box<dyn Fn(i64)>>,
    }

    #[derive(Default)]
    struct ProbeUpdates {
        seen: Option<i64>,
        other: Option<i64>,
    }

    impl Watcher for Probe {
        type Updates = ProbeUpdates;

        fn notify(&self, updates: &ProbeUpdates) {
            if let (Some(run), Some(value)) = (&self.seen, &updates.seen) {
                run(*value);
            }
            if let (Some(run), Some(value)) = (&self.other, &updates.other) {
                run(*value);
            }
        }
    }

    fn recorder() -> (Rc<RefCell<Vec<i64>>>, Box<dyn Fn(i64)>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        (log, Box::new(move |value| sink.borrow_mut().push(value)))
    }

    #[test]
    fn watch_without_broadcast_never_calls() {
        let watchable: Watchable<Probe> = Watchable::new();
        let (log, sink) = recorder();
        let sub = watchable.watch(Probe {
            seen: Some(sink),
            ..Probe::default()
        });
        assert!(log.borrow().is_empty());
        sub.unsubscribe();
    }

    #[test]
    fn broadcast_delivers_matching_key() {
        let watchable: Watchable<Probe> = Watchable::new();
        let (log, sink) = recorder();
        let _sub = watchable.watch(Probe {
            seen: Some(sink),
            ..Probe::default()
        });
        watchable.broadcast(&ProbeUpdates {
            seen: Some(7),
            ..ProbeUpdates::default()
        });
        assert_eq!(*log.borrow(), vec![7]);
    }

    #[test]
    fn absent_key_skips_watcher() {
        let watchable: Watchable<Probe> = Watchable::new();
        let (log, sink) = recorder();
        let _sub = watchable.watch(Probe {
            seen: Some(sink),
            ..Probe::default()
        });
        watchable.broadcast(&ProbeUpdates {
            other: Some(1),
            ..ProbeUpdates::default()
        });
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn broadcast_counts_every_invocation() {
        let watchable: Watchable<Probe> = Watchable::new();
        let (log, sink) = recorder();
        let _sub = watchable.watch(Probe {
            seen: Some(sink),
            ..Probe::default()
        });
        watchable.broadcast(&ProbeUpdates {
            seen: Some(1),
            ..ProbeUpdates::default()
        });
        watchable.broadcast(&ProbeUpdates {
            seen: Some(2),
            ..ProbeUpdates::default()
        });
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let watchable: Watchable<Probe> = Watchable::new();
        let (log, sink) = recorder();
        let sub = watchable.watch(Probe {
            seen: Some(sink),
            ..Probe::default()
        });
        sub.unsubscribe();
        watchable.broadcast(&ProbeUpdates {
            seen: Some(3),
            ..ProbeUpdates::default()
        });
        assert!(log.borrow().is_empty());
        assert!(watchable.is_empty());
    }

    #[test]
    fn dropping_guard_stops_delivery() {
        let watchable: Watchable<Probe> = Watchable::new();
        let (log, sink) = recorder();
        {
            let _sub = watchable.watch(Probe {
                seen: Some(sink),
                ..Probe::default()
            });
        }
        watchable.broadcast(&ProbeUpdates {
            seen: Some(3),
            ..ProbeUpdates::default()
        });
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn forget_keeps_registration_alive() {
        let watchable: Watchable<Probe> = Watchable::new();
        let (log, sink) = recorder();
        watchable
            .watch(Probe {
                seen: Some(sink),
                ..Probe::default()
            })
            .forget();
        watchable.broadcast(&ProbeUpdates {
            seen: Some(9),
            ..ProbeUpdates::default()
        });
        assert_eq!(*log.borrow(), vec![9]);
        assert_eq!(watchable.len(), 1);
    }

    #[test]
    fn registration_order_is_delivery_order() {
        let watchable: Watchable<Probe> = Watchable::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut subs = Vec::new();
        for tag in [10, 20, 30] {
            let sink = Rc::clone(&log);
            subs.push(watchable.watch(Probe {
                seen: Some(Box::new(move |value| sink.borrow_mut().push(tag + value))),
                ..Probe::default()
            }));
        }
        watchable.broadcast(&ProbeUpdates {
            seen: Some(1),
            ..ProbeUpdates::default()
        });
        assert_eq!(*log.borrow(), vec![11, 21, 31]);
    }

    #[test]
    fn mid_broadcast_unsubscribe_skips_later_watcher() {
        let watchable: Watchable<Probe> = Watchable::new();
        let second_sub: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let (log, sink) = recorder();

        let killer = Rc::clone(&second_sub);
        let _first = watchable.watch(Probe {
            seen: Some(Box::new(move |_| {
                if let Some(sub) = killer.borrow_mut().take() {
                    sub.unsubscribe();
                }
            })),
            ..Probe::default()
        });
        *second_sub.borrow_mut() = Some(watchable.watch(Probe {
            seen: Some(sink),
            ..Probe::default()
        }));

        watchable.broadcast(&ProbeUpdates {
            seen: Some(1),
            ..ProbeUpdates::default()
        });
        assert!(log.borrow().is_empty());
        assert_eq!(watchable.len(), 1);
    }

    #[test]
    fn watcher_added_mid_broadcast_joins_next_round() {
        let watchable: Watchable<Probe> = Watchable::new();
        let (log, sink) = recorder();
        let log_for_adder = Rc::new(RefCell::new(Some(sink)));

        let registry = watchable.clone();
        let _first = watchable.watch(Probe {
            seen: Some(Box::new(move |_| {
                if let Some(sink) = log_for_adder.borrow_mut().take() {
                    registry
                        .watch(Probe {
                            seen: Some(sink),
                            ..Probe::default()
                        })
                        .forget();
                }
            })),
            ..Probe::default()
        });

        watchable.broadcast(&ProbeUpdates {
            seen: Some(1),
            ..ProbeUpdates::default()
        });
        assert!(log.borrow().is_empty());

        watchable.broadcast(&ProbeUpdates {
            seen: Some(2),
            ..ProbeUpdates::default()
        });
        assert_eq!(*log.borrow(), vec![2]);
    }

    #[test]
    fn subscription_outliving_registry_is_inert() {
        let watchable: Watchable<Probe> = Watchable::new();
        let sub = watchable.watch(Probe::default());
        drop(watchable);
        sub.unsubscribe();
    }

    #[test]
    fn len_tracks_registrations() {
        let watchable: Watchable<Probe> = Watchable::new();
        assert!(watchable.is_empty());
        let a = watchable.watch(Probe::default());
        let b = watchable.watch(Probe::default());
        assert_eq!(watchable.len(), 2);
        a.unsubscribe();
        assert_eq!(watchable.len(), 1);
        drop(b);
        assert!(watchable.is_empty());
    }
}
