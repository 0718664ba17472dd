#![forbid(unsafe_code)]

//! Schema-validated state container for Rill.
//!
//! A [`Store`] wraps a [`Schema`] of defaulted, optionally-validated fields
//! and broadcasts `state`/`errors` events through the `rill-core` registry
//! whenever a partial update is merged in.

pub mod schema;
pub mod store;

pub use schema::{Field, Schema, SchemaBuilder};
pub use store::{ErrorMap, StateMap, Store, StoreBuilder, StoreError, StoreUpdates, StoreWatcher};
