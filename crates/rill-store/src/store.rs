#![forbid(unsafe_code)]

//! Schema-validated state container with dispatchable named transitions.
//!
//! A [`Store`] keeps two parallel maps keyed by schema field name: `state`
//! (an entry for every field, defaulted) and `errors` (entries only for
//! fields currently failing validation). Partial updates merge
//! right-biased over defaults and current state, restricted to schema
//! keys, and each merge broadcasts `state` then `errors` as two
//! independent events through the `rill-core` registry.
//!
//! # Invariants
//!
//! 1. `state` always holds an entry for every schema field.
//! 2. Keys outside the schema never enter `state`.
//! 3. Validators run in schema declaration order; the error map itself is
//!    compared by key/value, not iteration order.
//! 4. `state()`/`errors()` return fresh copies on every call — callers get
//!    no reference identity across calls.
//!
//! # Example
//!
//! ```
//! use rill_store::{Schema, Store, StoreWatcher};
//! use serde_json::json;
//!
//! let schema = Schema::builder()
//!     .field("count", json!(0))
//!     .build()
//!     .unwrap();
//! let store = Store::builder().schema(schema).build().unwrap();
//!
//! let _watch = store.watch(StoreWatcher::new().on_state(|state| {
//!     println!("count is now {}", state["count"]);
//! }));
//! store.update(json!({ "count": 5 }));
//! assert_eq!(store.state()["count"], json!(5));
//! ```

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use rill_core::expect::{ExpectError, Invalid};
use rill_core::watchable::{Subscription, Watchable, Watcher};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::schema::Schema;

/// State map: schema field name → current value.
pub type StateMap = Map<String, Value>;

/// Error map: schema field name → current validation failure.
pub type ErrorMap = BTreeMap<String, Invalid>;

type ActionFn = Rc<dyn Fn(&StateMap, Value) -> Value>;

/// Runtime store failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The dispatch table has no action under this name.
    #[error("unknown action \"{name}\"")]
    UnknownAction { name: String },
}

/// Caller-supplied callbacks for store events.
///
/// Both fields are optional; a watcher receives only the event categories
/// it declares.
#[derive(Default)]
pub struct StoreWatcher {
    on_state: Option<Box<dyn Fn(StateMap)>>,
    on_errors: Option<Box<dyn Fn(ErrorMap)>>,
}

impl StoreWatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive the full state map after every merge.
    #[must_use]
    pub fn on_state(mut self, run: impl Fn(StateMap) + 'static) -> Self {
        self.on_state = Some(Box::new(run));
        self
    }

    /// Receive the full error map after every merge.
    #[must_use]
    pub fn on_errors(mut self, run: impl Fn(ErrorMap) + 'static) -> Self {
        self.on_errors = Some(Box::new(run));
        self
    }
}

impl fmt::Debug for StoreWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreWatcher")
            .field("state", &self.on_state.is_some())
            .field("errors", &self.on_errors.is_some())
            .finish()
    }
}

/// Update bundle for store broadcasts. A `None` entry is not delivered.
#[derive(Debug, Default)]
pub struct StoreUpdates {
    pub state: Option<StateMap>,
    pub errors: Option<ErrorMap>,
}

impl Watcher for StoreWatcher {
    type Updates = StoreUpdates;

    fn notify(&self, updates: &StoreUpdates) {
        if let (Some(run), Some(state)) = (&self.on_state, &updates.state) {
            run(state.clone());
        }
        if let (Some(run), Some(errors)) = (&self.on_errors, &updates.errors) {
            run(errors.clone());
        }
    }
}

struct StoreInner {
    schema: Schema,
    actions: HashMap<String, ActionFn>,
    state: RefCell<StateMap>,
    errors: RefCell<ErrorMap>,
    watchers: Watchable<StoreWatcher>,
}

/// Schema-validated, mergeable state/errors store.
///
/// Cloning a `Store` creates a new handle to the **same** container.
pub struct Store {
    inner: Rc<StoreInner>,
}

impl Clone for Store {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl Store {
    /// Start building a store.
    #[must_use]
    pub fn builder() -> StoreBuilder {
        StoreBuilder {
            schema: None,
            actions: HashMap::new(),
        }
    }

    /// Register a watcher. Standard registry contract.
    pub fn watch(&self, watcher: StoreWatcher) -> Subscription {
        self.inner.watchers.watch(watcher)
    }

    /// Fresh copy of the current state map.
    #[must_use]
    pub fn state(&self) -> StateMap {
        self.inner.state.borrow().clone()
    }

    /// Fresh copy of the current error map.
    #[must_use]
    pub fn errors(&self) -> ErrorMap {
        self.inner.errors.borrow().clone()
    }

    /// Merge `changes` into the state and broadcast.
    ///
    /// Next state is defaults ⊕ current ⊕ changes, right-biased; keys
    /// outside the schema are dropped, and a non-object `changes` value
    /// contributes nothing (the merge still runs and still broadcasts).
    /// `state` and `errors` go out as two independent events, in that
    /// order.
    pub fn update(&self, changes: Value) {
        let changes = match changes {
            Value::Object(fields) => fields,
            _ => StateMap::new(),
        };
        self.apply(changes, true);
    }

    /// Set state back to schema defaults and broadcast.
    pub fn reset(&self) {
        tracing::debug!(target: "rill::store", "reset");
        self.apply(StateMap::new(), false);
    }

    /// Invoke the named action and feed its patch into [`Store::update`].
    ///
    /// The action receives the current state and `args` and returns a
    /// partial state patch.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError::UnknownAction`] when `name` was never
    /// configured.
    pub fn dispatch(&self, name: &str, args: Value) -> Result<(), StoreError> {
        let action = self
            .inner
            .actions
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownAction {
                name: name.to_owned(),
            })?;
        tracing::debug!(target: "rill::store", action = name, "dispatch");
        let patch = {
            let state = self.inner.state.borrow();
            action(&state, args)
        };
        self.update(patch);
        Ok(())
    }

    fn apply(&self, changes: StateMap, keep_current: bool) {
        let mut next = self.inner.schema.defaults();
        if keep_current {
            for (name, value) in self.inner.state.borrow().iter() {
                next.insert(name.clone(), value.clone());
            }
        }
        for (name, value) in changes {
            if self.inner.schema.contains(&name) {
                next.insert(name, value);
            }
        }
        *self.inner.state.borrow_mut() = next.clone();
        tracing::trace!(target: "rill::store", fields = next.len(), "state merged");
        self.inner.watchers.broadcast(&StoreUpdates {
            state: Some(next),
            errors: None,
        });

        let errors = self.check_fields();
        *self.inner.errors.borrow_mut() = errors.clone();
        tracing::trace!(target: "rill::store", failing = errors.len(), "errors recomputed");
        self.inner.watchers.broadcast(&StoreUpdates {
            state: None,
            errors: Some(errors),
        });
    }

    /// Run every field validator against the current state, in schema
    /// declaration order.
    fn check_fields(&self) -> ErrorMap {
        let state = self.inner.state.borrow();
        let mut errors = ErrorMap::new();
        for (name, field) in self.inner.schema.fields() {
            let Some(validator) = field.validator() else {
                continue;
            };
            // Every schema field has a state entry by construction.
            let value = state.get(name).cloned().unwrap_or(Value::Null);
            if let Some(invalid) = validator.run(&value, &format!("{name} is not valid")) {
                errors.insert(name.to_owned(), invalid);
            }
        }
        errors
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("fields", &self.inner.schema.len())
            .field("failing", &self.inner.errors.borrow().len())
            .field("watchers", &self.inner.watchers.len())
            .finish()
    }
}

/// Builder for [`Store`].
pub struct StoreBuilder {
    schema: Option<Schema>,
    actions: HashMap<String, ActionFn>,
}

impl StoreBuilder {
    /// Supply the field schema. Required.
    #[must_use]
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Register a named action for the dispatch table.
    ///
    /// The action is a pure function from current state plus caller args
    /// to a partial state patch.
    #[must_use]
    pub fn action(
        mut self,
        name: impl Into<String>,
        run: impl Fn(&StateMap, Value) -> Value + 'static,
    ) -> Self {
        self.actions.insert(name.into(), Rc::new(run));
        self
    }

    /// Finish the store.
    ///
    /// Initial state is the schema defaults; initial errors are computed
    /// from them. Nothing is broadcast at construction.
    ///
    /// # Errors
    ///
    /// Fails with [`ExpectError::MissingRequired`] when no schema was
    /// supplied.
    pub fn build(self) -> Result<Store, ExpectError> {
        let schema = self.schema.ok_or(ExpectError::MissingRequired {
            name: "schema".to_owned(),
        })?;
        let store = Store {
            inner: Rc::new(StoreInner {
                state: RefCell::new(schema.defaults()),
                errors: RefCell::new(ErrorMap::new()),
                schema,
                actions: self.actions,
                watchers: Watchable::new(),
            }),
        };
        let initial = store.check_fields();
        *store.inner.errors.borrow_mut() = initial;
        Ok(store)
    }
}

impl fmt::Debug for StoreBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreBuilder")
            .field("schema", &self.schema.is_some())
            .field("actions", &self.actions.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
