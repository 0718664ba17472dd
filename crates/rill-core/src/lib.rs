#![forbid(unsafe_code)]

//! Core: observer registry and validation primitives for Rill.
//!
//! This crate provides the two leaf pieces every other Rill component is
//! built on:
//!
//! - [`Watchable`]: a generic subscribe/broadcast registry with per-field
//!   watcher isolation.
//! - [`expect`]: runtime kind assertions for dynamic JSON values and a
//!   two-shape validator adapter.

pub mod expect;
pub mod watchable;

pub use expect::{Check, ExpectError, Invalid, Kind, Validator};
pub use watchable::{Subscription, Watchable, Watcher};
