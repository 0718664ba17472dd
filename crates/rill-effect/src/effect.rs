#![forbid(unsafe_code)]

//! The action-execution unit: one wrapped operation with data/error/status
//! notification and replay.
//!
//! An [`Effect`] owns a handler (synchronous or asynchronous), an optional
//! declared payload shape, optional static common fields, and an optional
//! payload mapper. [`Effect::execute`] merges, maps, and validates the
//! payload, then runs the handler and broadcasts the outcome; the most
//! recent input is retained so [`Effect::redo`] can replay it without new
//! arguments, and the most recent successful value is cached so late
//! subscribers are not starved until the next execution.
//!
//! # Architecture
//!
//! `Effect` uses `Rc<RefCell<..>>` for single-threaded shared ownership;
//! cloning creates a new handle to the same unit. Pending handler results
//! are spawned onto the ambient current-thread task set and broadcast when
//! they settle.
//!
//! # Invariants
//!
//! 1. A payload rejected by the declared shape broadcasts one `error`
//!    event and never reaches the handler, records no last-payload, and
//!    leaves the loading status untouched.
//! 2. Every accepted execution broadcasts `loading: true` before the
//!    handler runs and `loading: false` in the same bundle as its
//!    `data`/`error` settlement.
//! 3. Overlapping executions are not serialized: each broadcasts its own
//!    loading status, and whichever settles last determines the final
//!    `data`/`error` seen by watchers.
//! 4. The cache holds the last *successful* value only; failures leave it
//!    untouched.
//!
//! # Failure Modes
//!
//! - **Handler failure**: delivered as an `error` event, never thrown.
//! - **Watcher callback panics**: not caught; they propagate out of the
//!   broadcast (or out of the [`Execution`] being awaited, for pending
//!   settlements).
//!
//! # Example
//!
//! ```
//! use rill_effect::{Effect, EffectWatcher, Outcome};
//! use serde_json::json;
//!
//! let double = Effect::builder()
//!     .handler(|payload| {
//!         let amount = payload["amount"].as_i64().unwrap_or(0);
//!         Outcome::ok(json!(amount * 2))
//!     })
//!     .build()
//!     .unwrap();
//!
//! let _watch = double.watch(EffectWatcher::new().on_data(|data| {
//!     assert_eq!(data, json!(6));
//! }));
//! double.execute(json!({ "amount": 3 })).detach();
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::future::LocalBoxFuture;
use indexmap::IndexMap;
use rill_core::expect::{self, ExpectError, Kind, Validator};
use rill_core::watchable::{Subscription, Watchable, Watcher};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;

use crate::error::{ConfigError, EffectError, HandlerResult};

/// What a handler hands back: an immediate result or a pending one.
pub enum Outcome {
    Ready(HandlerResult),
    Pending(LocalBoxFuture<'static, HandlerResult>),
}

impl Outcome {
    /// An immediately-successful result.
    #[must_use]
    pub fn ok(value: Value) -> Self {
        Self::Ready(Ok(value))
    }

    /// An immediate failure.
    #[must_use]
    pub fn err(error: impl Into<crate::error::HandlerError>) -> Self {
        Self::Ready(Err(error.into()))
    }

    /// A pending result, settled when `future` resolves.
    #[must_use]
    pub fn pending(future: impl Future<Output = HandlerResult> + 'static) -> Self {
        Self::Pending(Box::pin(future))
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            Self::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// Loading flag broadcast on the `status` channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub loading: bool,
}

/// Declared expectations for one payload key.
#[derive(Clone, Debug, Default)]
pub struct FieldSpec {
    pub(crate) required: bool,
    pub(crate) kind: Option<Kind>,
    pub(crate) validator: Option<Validator>,
}

impl FieldSpec {
    /// The key must be present in every accepted payload.
    #[must_use]
    pub fn required() -> Self {
        Self {
            required: true,
            ..Self::default()
        }
    }

    /// The key may be absent; checks below apply only when present.
    #[must_use]
    pub fn optional() -> Self {
        Self::default()
    }

    /// Expect the value to have this runtime kind.
    #[must_use]
    pub fn kind(mut self, kind: Kind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Run this validator against the value.
    #[must_use]
    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }
}

/// Caller-supplied callbacks for effect events.
///
/// All fields are optional; a watcher receives only the event categories
/// it declares. Data values arrive as independent clones; errors arrive as
/// shared handles.
#[derive(Default)]
pub struct EffectWatcher {
    on_data: Option<Box<dyn Fn(Value)>>,
    on_error: Option<Box<dyn Fn(Rc<EffectError>)>>,
    on_status: Option<Box<dyn Fn(Status)>>,
}

impl EffectWatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive each successful result value.
    #[must_use]
    pub fn on_data(mut self, run: impl Fn(Value) + 'static) -> Self {
        self.on_data = Some(Box::new(run));
        self
    }

    /// Receive each validation or handler failure.
    #[must_use]
    pub fn on_error(mut self, run: impl Fn(Rc<EffectError>) + 'static) -> Self {
        self.on_error = Some(Box::new(run));
        self
    }

    /// Receive each loading-status change.
    #[must_use]
    pub fn on_status(mut self, run: impl Fn(Status) + 'static) -> Self {
        self.on_status = Some(Box::new(run));
        self
    }
}

impl fmt::Debug for EffectWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectWatcher")
            .field("data", &self.on_data.is_some())
            .field("error", &self.on_error.is_some())
            .field("status", &self.on_status.is_some())
            .finish()
    }
}

/// Update bundle for effect broadcasts. A `None` entry is not delivered.
#[derive(Debug, Default)]
pub struct EffectUpdates {
    pub data: Option<Value>,
    pub error: Option<Rc<EffectError>>,
    pub status: Option<Status>,
}

impl Watcher for EffectWatcher {
    type Updates = EffectUpdates;

    fn notify(&self, updates: &EffectUpdates) {
        if let (Some(run), Some(data)) = (&self.on_data, &updates.data) {
            run(data.clone());
        }
        if let (Some(run), Some(error)) = (&self.on_error, &updates.error) {
            run(Rc::clone(error));
        }
        if let (Some(run), Some(status)) = (&self.on_status, &updates.status) {
            run(*status);
        }
    }
}

pub(crate) type Handler = Rc<dyn Fn(Value) -> Outcome>;
pub(crate) type Mapper = Rc<dyn Fn(Value) -> Value>;

struct EffectInner {
    name: Option<String>,
    handler: Handler,
    mapper: Option<Mapper>,
    payload_spec: IndexMap<String, FieldSpec>,
    common: Map<String, Value>,
    last_payload: RefCell<Option<Value>>,
    cache: RefCell<Option<Value>>,
    loading: Cell<bool>,
    watchers: Watchable<EffectWatcher>,
}

/// One wrapped operation with notification and replay.
///
/// Cloning an `Effect` creates a new handle to the **same** unit.
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl Effect {
    /// Start building an effect.
    #[must_use]
    pub fn builder() -> EffectBuilder {
        EffectBuilder {
            name: None,
            handler: None,
            mapper: None,
            payload_spec: IndexMap::new(),
            common: Map::new(),
        }
    }

    pub(crate) fn from_parts(
        name: Option<String>,
        handler: Handler,
        mapper: Option<Mapper>,
        payload_spec: IndexMap<String, FieldSpec>,
        common: Map<String, Value>,
    ) -> Self {
        Self {
            inner: Rc::new(EffectInner {
                name,
                handler,
                mapper,
                payload_spec,
                common,
                last_payload: RefCell::new(None),
                cache: RefCell::new(None),
                loading: Cell::new(false),
                watchers: Watchable::new(),
            }),
        }
    }

    /// Register a watcher.
    ///
    /// Standard registry contract, plus: a newly-registered watcher that
    /// declares a data callback immediately receives the cached last
    /// successful value, synchronously, so late subscribers are not
    /// starved until the next execution. A cached JSON null still counts.
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

    /// Merge, map, validate, and run the wrapped operation.
    ///
    /// The payload is merged over the configured common fields
    /// (right-biased), passed through the mapper, and validated against
    /// the declared shape. A rejected payload broadcasts one `error` event
    /// and returns a settled [`Execution`] without invoking the handler.
    /// Otherwise the original `payload` is recorded for replay, `loading:
    /// true` goes out, and the handler runs: a ready outcome settles
    /// before this call returns, a pending one is spawned and settles when
    /// its future resolves.
    ///
    /// The returned handle completes at settlement; dropping it detaches
    /// the in-flight operation (there is no cancellation).
    ///
    /// # Panics
    ///
    /// A pending outcome is spawned with `tokio::task::spawn_local`, which
    /// panics outside a current-thread `LocalSet` context.
    pub fn execute(&self, payload: Value) -> Execution {
        let merged = self.merge_common(&payload);
        let mapped = match &self.inner.mapper {
            Some(map) => map(merged),
            None => merged,
        };
        if let Err(error) = self.check_payload(&mapped) {
            tracing::debug!(
                target: "rill::effect",
                name = self.inner.name.as_deref(),
                %error,
                "payload rejected",
            );
            self.inner.watchers.broadcast(&EffectUpdates {
                error: Some(Rc::new(error)),
                ..EffectUpdates::default()
            });
            return Execution::settled();
        }

        *self.inner.last_payload.borrow_mut() = Some(payload);
        self.inner.loading.set(true);
        self.inner.watchers.broadcast(&EffectUpdates {
            status: Some(Status { loading: true }),
            ..EffectUpdates::default()
        });
        tracing::debug!(
            target: "rill::effect",
            name = self.inner.name.as_deref(),
            "execute",
        );

        match (self.inner.handler)(mapped) {
            Outcome::Ready(result) => {
                self.settle(result);
                Execution::settled()
            }
            Outcome::Pending(future) => {
                let effect = self.clone();
                let handle = tokio::task::spawn_local(async move {
                    let result = future.await;
                    effect.settle(result);
                });
                Execution::running(handle)
            }
        }
    }

    /// Replay the last recorded payload (empty object when none yet).
    pub fn redo(&self) -> Execution {
        let payload = self
            .inner
            .last_payload
            .borrow()
            .clone()
            .unwrap_or(Value::Object(Map::new()));
        self.execute(payload)
    }

    /// Alias for [`Effect::redo`], used by dependency cascades.
    pub fn refresh(&self) -> Execution {
        self.redo()
    }

    /// The most recent loading flag.
    #[must_use]
    pub fn status(&self) -> Status {
        Status {
            loading: self.inner.loading.get(),
        }
    }

    /// Fresh copy of the cached last successful value.
    #[must_use]
    pub fn cached(&self) -> Option<Value> {
        self.inner.cache.borrow().clone()
    }

    fn settle(&self, result: HandlerResult) {
        self.inner.loading.set(false);
        match result {
            Ok(data) => {
                *self.inner.cache.borrow_mut() = Some(data.clone());
                tracing::debug!(
                    target: "rill::effect",
                    name = self.inner.name.as_deref(),
                    "settled ok",
                );
                self.inner.watchers.broadcast(&EffectUpdates {
                    data: Some(data),
                    error: None,
                    status: Some(Status { loading: false }),
                });
            }
            Err(error) => {
                tracing::debug!(
                    target: "rill::effect",
                    name = self.inner.name.as_deref(),
                    %error,
                    "settled err",
                );
                self.inner.watchers.broadcast(&EffectUpdates {
                    data: None,
                    error: Some(Rc::new(EffectError::Failed(error))),
                    status: Some(Status { loading: false }),
                });
            }
        }
    }

    fn merge_common(&self, payload: &Value) -> Value {
        if self.inner.common.is_empty() {
            return payload.clone();
        }
        let mut merged = self.inner.common.clone();
        // A non-object payload contributes nothing to the merged object.
        if let Value::Object(fields) = payload {
            for (name, value) in fields {
                merged.insert(name.clone(), value.clone());
            }
        }
        Value::Object(merged)
    }

    fn check_payload(&self, payload: &Value) -> Result<(), EffectError> {
        if self.inner.payload_spec.is_empty() {
            return Ok(());
        }
        let empty = Map::new();
        let fields = payload.as_object().unwrap_or(&empty);
        for (name, spec) in &self.inner.payload_spec {
            let value = fields.get(name);
            match spec.kind {
                Some(kind) => expect::kind(name, value, kind, !spec.required)?,
                None if spec.required && value.is_none() => {
                    return Err(ExpectError::MissingRequired { name: name.clone() }.into());
                }
                None => {}
            }
            if let (Some(validator), Some(value)) = (&spec.validator, value) {
                if let Some(invalid) = validator.run(value, &format!("{name} is not valid")) {
                    return Err(invalid.into());
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("name", &self.inner.name)
            .field("loading", &self.inner.loading.get())
            .field("cached", &self.inner.cache.borrow().is_some())
            .field("watchers", &self.inner.watchers.len())
            .finish()
    }
}

/// Settlement handle returned by [`Effect::execute`].
///
/// Completes once the execution has settled (its `data`/`error` broadcast
/// is done). Dropping the handle detaches the in-flight operation; it
/// still settles and notifies watchers.
#[must_use = "dropping an Execution detaches it; await it to observe settlement"]
pub struct Execution {
    handle: Option<JoinHandle<()>>,
}

impl Execution {
    fn settled() -> Self {
        Self { handle: None }
    }

    fn running(handle: JoinHandle<()>) -> Self {
        Self { handle: Some(handle) }
    }

    /// Whether settlement has already happened.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.handle.as_ref().is_none_or(|handle| handle.is_finished())
    }

    /// Let the execution settle on its own.
    pub fn detach(self) {}
}

impl Future for Execution {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let Some(handle) = self.handle.as_mut() else {
            return Poll::Ready(());
        };
        match Pin::new(handle).poll(cx) {
            Poll::Ready(joined) => {
                self.handle = None;
                if let Err(error) = joined {
                    if error.is_panic() {
                        // A watcher panic inside the settle task surfaces
                        // to whoever awaits the execution.
                        std::panic::resume_unwind(error.into_panic());
                    }
                }
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl fmt::Debug for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Execution")
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Builder for [`Effect`].
pub struct EffectBuilder {
    name: Option<String>,
    handler: Option<Handler>,
    mapper: Option<Mapper>,
    payload_spec: IndexMap<String, FieldSpec>,
    common: Map<String, Value>,
}

impl EffectBuilder {
    /// Diagnostic name used in trace events.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The wrapped operation. Required.
    #[must_use]
    pub fn handler(mut self, run: impl Fn(Value) -> Outcome + 'static) -> Self {
        self.handler = Some(Rc::new(run));
        self
    }

    /// Transform applied to the merged payload before validation.
    #[must_use]
    pub fn mapper(mut self, map: impl Fn(Value) -> Value + 'static) -> Self {
        self.mapper = Some(Rc::new(map));
        self
    }

    /// Declare expectations for one payload key.
    #[must_use]
    pub fn payload_field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.payload_spec.insert(name.into(), spec);
        self
    }

    /// A static field merged under every payload.
    #[must_use]
    pub fn common_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.common.insert(name.into(), value);
        self
    }

    /// Finish the effect.
    ///
    /// # Errors
    ///
    /// Fails with [`ConfigError::Expect`] when no handler was supplied.
    pub fn build(self) -> Result<Effect, ConfigError> {
        let handler = self.handler.ok_or(ExpectError::MissingRequired {
            name: "handler".to_owned(),
        })?;
        Ok(Effect::from_parts(
            self.name,
            handler,
            self.mapper,
            self.payload_spec,
            self.common,
        ))
    }
}

impl fmt::Debug for EffectBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectBuilder")
            .field("name", &self.name)
            .field("handler", &self.handler.is_some())
            .field("payload_keys", &self.payload_spec.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
