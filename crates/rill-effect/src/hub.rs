#![forbid(unsafe_code)]

//! Dependency coordinator: one notification stream over several effects.
//!
//! A [`Hub`] absorbs effects and re-broadcasts their `data`/`error`/
//! `status` events through its own registry, so a consumer can treat a
//! cluster of related asynchronous sources as one stream. Units absorbed
//! with `depends = true` are refreshed whenever any *primary* (non-
//! dependent) unit produces new data, keeping derived sources in sync
//! automatically.
//!
//! # Invariants
//!
//! 1. Every absorbed unit's events relay outward unchanged, in the order
//!    the unit broadcasts them.
//! 2. The refresh cascade runs synchronously within the triggering data
//!    broadcast, not deferred to a later tick.
//! 3. A `data` event from a unit flagged `depends` relays outward but does
//!    not re-trigger the cascade. This bounds the feedback loop a
//!    dependent unit's own refresh result would otherwise cause — the
//!    self-referential absorb included.
//! 4. The last relayed data value is cached and handed to late watchers at
//!    registration.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use rill_core::watchable::{Subscription, Watchable, Watcher};
use serde_json::Value;

use crate::effect::{Effect, EffectUpdates, EffectWatcher};

struct Absorbed {
    effect: Effect,
    depends: bool,
    _watch: Subscription,
}

struct HubInner {
    watchers: Watchable<EffectWatcher>,
    items: RefCell<Vec<Absorbed>>,
    cache: RefCell<Option<Value>>,
}

impl HubInner {
    fn relay_data(&self, data: Value, from_dependent: bool) {
        *self.cache.borrow_mut() = Some(data.clone());
        self.watchers.broadcast(&EffectUpdates {
            data: Some(data),
            ..EffectUpdates::default()
        });
        if from_dependent {
            return;
        }
        let dependents: Vec<Effect> = self
            .items
            .borrow()
            .iter()
            .filter(|item| item.depends)
            .map(|item| item.effect.clone())
            .collect();
        if dependents.is_empty() {
            return;
        }
        tracing::debug!(target: "rill::hub", refreshing = dependents.len(), "cascade");
        for effect in dependents {
            effect.refresh().detach();
        }
    }
}

/// Aggregator of several effects with dependent-refresh cascading.
///
/// Cloning a `Hub` creates a new handle to the **same** coordinator.
pub struct Hub {
    inner: Rc<HubInner>,
}

impl Clone for Hub {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    /// An empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(HubInner {
                watchers: Watchable::new(),
                items: RefCell::new(Vec::new()),
                cache: RefCell::new(None),
            }),
        }
    }

    /// Absorb `effect` into this hub's stream.
    ///
    /// A pass-through watcher relays every event outward. With `depends =
    /// true` the unit is also refreshed whenever a primary unit produces
    /// data. Absorbing a unit that already holds cached data relays that
    /// value (and runs the cascade) immediately, exactly as if the data
    /// event had just happened.
    ///
    /// The pass-through registration lives as long as the hub.
    pub fn absorb(&self, effect: &Effect, depends: bool) {
        let data_hub = Rc::downgrade(&self.inner);
        let error_hub = Weak::clone(&data_hub);
        let status_hub = Weak::clone(&data_hub);
        let watch = effect.watch(
            EffectWatcher::new()
                .on_data(move |data| {
                    if let Some(hub) = data_hub.upgrade() {
                        hub.relay_data(data, depends);
                    }
                })
                .on_error(move |error| {
                    if let Some(hub) = error_hub.upgrade() {
                        hub.watchers.broadcast(&EffectUpdates {
                            error: Some(error),
                            ..EffectUpdates::default()
                        });
                    }
                })
                .on_status(move |status| {
                    if let Some(hub) = status_hub.upgrade() {
                        hub.watchers.broadcast(&EffectUpdates {
                            status: Some(status),
                            ..EffectUpdates::default()
                        });
                    }
                }),
        );
        self.inner.items.borrow_mut().push(Absorbed {
            effect: effect.clone(),
            depends,
            _watch: watch,
        });
        tracing::debug!(target: "rill::hub", depends, absorbed = self.inner.items.borrow().len(), "absorb");
    }

    /// Register a watcher.
    ///
    /// Standard registry contract, plus cached-data delivery to late
    /// watchers, as on [`Effect::watch`].
    pub fn watch(&self, watcher: EffectWatcher) -> Subscription {
        let cached = self.inner.cache.borrow().clone();
        if let Some(data) = cached {
            watcher.notify(&EffectUpdates {
                data: Some(data),
                ..EffectUpdates::default()
            });
        }
        self.inner.watchers.watch(watcher)
    }

    /// Number of absorbed units.
    #[must_use]
    pub fn absorbed(&self) -> usize {
        self.inner.items.borrow().len()
    }
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("absorbed", &self.absorbed())
            .field("watchers", &self.inner.watchers.len())
            .field("cached", &self.inner.cache.borrow().is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
