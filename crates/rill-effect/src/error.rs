#![forbid(unsafe_code)]

//! Error taxonomy for action units.
//!
//! Configuration contract violations ([`ConfigError`]) fail fast from
//! builders. Runtime failures ([`EffectError`]) are never thrown across
//! the watcher boundary: they are delivered on the `error` channel to any
//! watcher that asked for it, and silently dropped otherwise.

use rill_core::expect::{ExpectError, Invalid};
use thiserror::Error;

/// Opaque failure produced by a wrapped operation.
///
/// Handlers may perform any I/O internally; the data layer treats their
/// error type as opaque.
pub type HandlerError = Box<dyn std::error::Error + 'static>;

/// Result of a wrapped operation.
pub type HandlerResult = Result<serde_json::Value, HandlerError>;

/// Setup-time contract violations. Fatal: returned from builders, never
/// delivered through watcher channels.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Expect(#[from] ExpectError),

    /// The catalog has no method under this name.
    #[error("unknown method \"{name}\"")]
    UnknownMethod { name: String },
}

/// Runtime failures delivered on an effect's `error` channel.
#[derive(Debug, Error)]
pub enum EffectError {
    /// The merged payload violated the declared shape (wrong kind or
    /// missing required key).
    #[error(transparent)]
    Shape(#[from] ExpectError),

    /// A declared per-key validator rejected the payload.
    #[error(transparent)]
    Invalid(#[from] Invalid),

    /// The wrapped operation itself failed.
    #[error("handler failed: {0}")]
    Failed(HandlerError),
}
