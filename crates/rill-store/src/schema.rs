#![forbid(unsafe_code)]

//! Field schemas: named defaults plus optional validators.
//!
//! A [`Schema`] defines the full key-space of a store's state and error
//! maps. Field order is the declaration order and drives deterministic
//! validator evaluation; the resulting maps themselves carry no ordering
//! semantics.

use std::fmt;

use indexmap::IndexMap;
use rill_core::expect::{ExpectError, Validator};
use serde_json::{Map, Value};

/// One named, defaulted, optionally-validated slot in a store.
#[derive(Clone)]
pub struct Field {
    default: Value,
    validator: Option<Validator>,
}

impl Field {
    /// A field with a default value and no validator.
    #[must_use]
    pub fn new(default: Value) -> Self {
        Self {
            default,
            validator: None,
        }
    }

    /// A field whose value is checked by `validator` after every merge.
    #[must_use]
    pub fn validated(default: Value, validator: Validator) -> Self {
        Self {
            default,
            validator: Some(validator),
        }
    }

    /// The field's default value.
    #[must_use]
    pub fn default_value(&self) -> &Value {
        &self.default
    }

    /// The field's validator, if any.
    #[must_use]
    pub fn validator(&self) -> Option<&Validator> {
        self.validator.as_ref()
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("default", &self.default)
            .field("validated", &self.validator.is_some())
            .finish()
    }
}

/// An ordered set of [`Field`]s.
#[derive(Clone, Debug)]
pub struct Schema {
    fields: IndexMap<String, Field>,
}

impl Schema {
    /// Start building a schema.
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder {
            fields: IndexMap::new(),
        }
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(name, field)| (name.as_str(), field))
    }

    /// Whether `name` is a schema field.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema has no fields. Never true for a built schema.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// A fresh state map holding every field's default.
    #[must_use]
    pub fn defaults(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|(name, field)| (name.clone(), field.default.clone()))
            .collect()
    }
}

/// Builder for [`Schema`].
///
/// Declaring a name twice replaces the earlier field, keeping its original
/// position.
#[derive(Debug)]
pub struct SchemaBuilder {
    fields: IndexMap<String, Field>,
}

impl SchemaBuilder {
    /// Declare a field with a default value.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, default: Value) -> Self {
        self.fields.insert(name.into(), Field::new(default));
        self
    }

    /// Declare a validated field.
    #[must_use]
    pub fn validated_field(
        mut self,
        name: impl Into<String>,
        default: Value,
        validator: Validator,
    ) -> Self {
        self.fields
            .insert(name.into(), Field::validated(default, validator));
        self
    }

    /// Finish the schema.
    ///
    /// # Errors
    ///
    /// Fails with [`ExpectError::MissingRequired`] when no field was
    /// declared.
    pub fn build(self) -> Result<Schema, ExpectError> {
        if self.fields.is_empty() {
            return Err(ExpectError::MissingRequired {
                name: "schema".to_owned(),
            });
        }
        Ok(Schema {
            fields: self.fields,
        })
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
    fn empty_schema_is_rejected() {
        let err = Schema::builder().build().unwrap_err();
        assert_eq!(
            err,
            ExpectError::MissingRequired {
                name: "schema".into()
            }
        );
    }

    #[test]
    fn defaults_cover_every_field() {
        let schema = Schema::builder()
            .field("count", json!(0))
            .field("name", json!(""))
            .field("flag", json!(false))
            .build()
            .unwrap();
        let defaults = schema.defaults();
        assert_eq!(defaults.len(), 3);
        assert_eq!(defaults["count"], json!(0));
        assert_eq!(defaults["name"], json!(""));
        assert_eq!(defaults["flag"], json!(false));
    }

    #[test]
    fn declaration_order_is_preserved() {
        let schema = Schema::builder()
            .field("b", json!(1))
            .field("a", json!(2))
            .field("c", json!(3))
            .build()
            .unwrap();
        let names: Vec<&str> = schema.fields().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn redeclaring_a_field_replaces_it_in_place() {
        let schema = Schema::builder()
            .field("a", json!(1))
            .field("b", json!(2))
            .field("a", json!(9))
            .build()
            .unwrap();
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.defaults()["a"], json!(9));
        let names: Vec<&str> = schema.fields().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
