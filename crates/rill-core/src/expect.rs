#![forbid(unsafe_code)]

//! Runtime kind assertions and validator adapters for dynamic values.
//!
//! Rill's payloads, state maps, and update bundles are dynamically shaped
//! ([`serde_json::Value`]). This module carries the runtime checks the type
//! system cannot: [`kind`] asserts that a value has an expected JSON kind
//! (or is permissibly absent), and [`Validator`] adapts the two validator
//! shapes consumers supply — plain predicates and schema-checker objects —
//! into a single "run and maybe return an error" call.
//!
//! Configuration contract violations surface as [`ExpectError`] and fail
//! fast at setup; value-level validation failures surface as [`Invalid`]
//! and flow through watcher channels.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use thiserror::Error;

/// Runtime kind of a [`Value`], the analog of a `typeof` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl Kind {
    /// Kind of `value`.
    #[must_use]
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Bool,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }

    /// Lowercase name used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A type/shape assertion failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpectError {
    #[error("expected \"{name}\" to be of kind \"{expected}\" but was given \"{actual}\"")]
    TypeMismatch {
        name: String,
        expected: Kind,
        actual: Kind,
    },

    #[error("expected \"{name}\" to be provided but no value was given")]
    MissingRequired { name: String },
}

/// Assert that `value` has `expected` kind.
///
/// A present value of the wrong kind fails with
/// [`ExpectError::TypeMismatch`]; an absent value fails with
/// [`ExpectError::MissingRequired`] unless `optional`. A present JSON null
/// counts as present with kind [`Kind::Null`].
///
/// # Errors
///
/// Returns the assertion failure described above.
pub fn kind(
    name: &str,
    value: Option<&Value>,
    expected: Kind,
    optional: bool,
) -> Result<(), ExpectError> {
    match value {
        Some(value) => {
            let actual = Kind::of(value);
            if actual == expected {
                Ok(())
            } else {
                Err(ExpectError::TypeMismatch {
                    name: name.to_owned(),
                    expected,
                    actual,
                })
            }
        }
        None if optional => Ok(()),
        None => Err(ExpectError::MissingRequired {
            name: name.to_owned(),
        }),
    }
}

/// A value-level validation failure.
///
/// Cloneable so one failure can fan out to every watcher interested in the
/// `errors` channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct Invalid {
    pub message: String,
}

impl Invalid {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A schema-checker object: validates a value and reports the failure it
/// finds.
///
/// This is the adapter seam for schema-library validators. Closures of
/// shape `Fn(&Value) -> Result<(), Invalid>` implement it for free.
pub trait Check {
    /// Validate `value`.
    ///
    /// # Errors
    ///
    /// Returns the validation failure, which the caller captures and
    /// forwards instead of propagating.
    fn check(&self, value: &Value) -> Result<(), Invalid>;
}

impl<F> Check for F
where
    F: Fn(&Value) -> Result<(), Invalid>,
{
    fn check(&self, value: &Value) -> Result<(), Invalid> {
        self(value)
    }
}

/// One of the two validator shapes consumers supply.
///
/// - [`Validator::Predicate`]: a plain boolean predicate; `false` produces
///   a generic [`Invalid`] carrying the message supplied at the call site.
/// - [`Validator::Checker`]: a [`Check`] object whose own failure is
///   captured and returned as-is.
#[derive(Clone)]
pub enum Validator {
    Predicate(Rc<dyn Fn(&Value) -> bool>),
    Checker(Rc<dyn Check>),
}

impl Validator {
    /// Wrap a plain predicate.
    #[must_use]
    pub fn predicate(run: impl Fn(&Value) -> bool + 'static) -> Self {
        Self::Predicate(Rc::new(run))
    }

    /// Wrap a schema-checker object.
    #[must_use]
    pub fn checker(check: impl Check + 'static) -> Self {
        Self::Checker(Rc::new(check))
    }

    /// Run the validator against `value`.
    ///
    /// Returns `None` when validation passes. A failing predicate produces
    /// a generic [`Invalid`] carrying `message`; a failing checker returns
    /// its own failure.
    #[must_use]
    pub fn run(&self, value: &Value, message: &str) -> Option<Invalid> {
        match self {
            Self::Predicate(run) => {
                if run(value) {
                    None
                } else {
                    Some(Invalid::new(message))
                }
            }
            Self::Checker(check) => check.check(value).err(),
        }
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Predicate(_) => f.write_str("Validator::Predicate"),
            Self::Checker(_) => f.write_str("Validator::Checker"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_of_every_variant() {
        assert_eq!(Kind::of(&Value::Null), Kind::Null);
        assert_eq!(Kind::of(&json!(true)), Kind::Bool);
        assert_eq!(Kind::of(&json!(1.5)), Kind::Number);
        assert_eq!(Kind::of(&json!("x")), Kind::String);
        assert_eq!(Kind::of(&json!([1])), Kind::Array);
        assert_eq!(Kind::of(&json!({"a": 1})), Kind::Object);
    }

    #[test]
    fn matching_kind_passes() {
        assert!(kind("id", Some(&json!("abc")), Kind::String, false).is_ok());
    }

    #[test]
    fn wrong_kind_is_a_mismatch() {
        let err = kind("id", Some(&json!(42)), Kind::String, false).unwrap_err();
        assert_eq!(
            err,
            ExpectError::TypeMismatch {
                name: "id".into(),
                expected: Kind::String,
                actual: Kind::Number,
            }
        );
        let message = err.to_string();
        assert!(message.contains("\"id\""));
        assert!(message.contains("string"));
        assert!(message.contains("number"));
    }

    #[test]
    fn absent_required_is_missing() {
        let err = kind("id", None, Kind::String, false).unwrap_err();
        assert_eq!(err, ExpectError::MissingRequired { name: "id".into() });
        assert!(err.to_string().contains("\"id\""));
    }

    #[test]
    fn absent_optional_passes() {
        assert!(kind("id", None, Kind::String, true).is_ok());
    }

    #[test]
    fn present_null_is_kind_null() {
        let err = kind("id", Some(&Value::Null), Kind::String, true).unwrap_err();
        assert!(matches!(err, ExpectError::TypeMismatch { actual: Kind::Null, .. }));
    }

    #[test]
    fn passing_predicate_returns_none() {
        let validator = Validator::predicate(|value| value.is_string());
        assert_eq!(validator.run(&json!("ok"), "nope"), None);
    }

    #[test]
    fn failing_predicate_carries_message() {
        let validator = Validator::predicate(|value| value.is_string());
        let invalid = validator.run(&json!(42), "memes is not valid").unwrap();
        assert_eq!(invalid.message, "memes is not valid");
    }

    #[test]
    fn checker_failure_is_captured() {
        let validator = Validator::checker(|value: &Value| {
            if value.as_i64().is_some_and(|n| n > 0) {
                Ok(())
            } else {
                Err(Invalid::new("must be positive"))
            }
        });
        assert_eq!(validator.run(&json!(3), "unused"), None);
        let invalid = validator.run(&json!(-1), "unused").unwrap();
        assert_eq!(invalid.message, "must be positive");
    }
}
