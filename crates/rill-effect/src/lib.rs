#![forbid(unsafe_code)]

//! Asynchronous action units for Rill.
//!
//! An [`Effect`] wraps one synchronous or asynchronous operation and
//! broadcasts `data`/`error`/`status` events through the `rill-core`
//! registry, remembering its last input for replay. A [`Catalog`] mints
//! configured effects from named method descriptors, and a [`Hub`] absorbs
//! several effects into one notification stream with dependent-refresh
//! cascading.

pub mod catalog;
pub mod effect;
pub mod error;
pub mod hub;

pub use catalog::{Catalog, CatalogBuilder, Method};
pub use effect::{
    Effect, EffectBuilder, EffectUpdates, EffectWatcher, Execution, FieldSpec, Outcome, Status,
};
pub use error::{ConfigError, EffectError, HandlerError, HandlerResult};
pub use hub::Hub;
