#![forbid(unsafe_code)]

//! Named method descriptors minting configured action units.
//!
//! A [`Catalog`] is a construction-time table of [`Method`]s — handler plus
//! declared payload shape plus static common fields. Consumers mint an
//! [`Effect`] per call site with [`Catalog::instance`], optionally binding
//! a payload mapper, the same way one persistence backend serves several
//! differently-mapped call sites.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use rill_core::expect::ExpectError;
use serde_json::{Map, Value};

use crate::effect::{Effect, FieldSpec, Handler, Outcome};
use crate::error::ConfigError;

/// One named operation: handler, declared payload shape, common fields.
#[derive(Clone)]
pub struct Method {
    handler: Handler,
    payload_spec: IndexMap<String, FieldSpec>,
    common: Map<String, Value>,
}

impl Method {
    /// A method around the given handler.
    #[must_use]
    pub fn new(run: impl Fn(Value) -> Outcome + 'static) -> Self {
        Self {
            handler: Rc::new(run),
            payload_spec: IndexMap::new(),
            common: Map::new(),
        }
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
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("payload_keys", &self.payload_spec.len())
            .field("common_keys", &self.common.len())
            .finish()
    }
}

/// A table of named methods.
#[derive(Clone, Debug)]
pub struct Catalog {
    methods: IndexMap<String, Method>,
}

impl Catalog {
    /// Start building a catalog.
    #[must_use]
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder {
            methods: IndexMap::new(),
        }
    }

    /// Mint an effect for the named method.
    ///
    /// # Errors
    ///
    /// Fails with [`ConfigError::UnknownMethod`] when `name` was never
    /// configured.
    pub fn instance(&self, name: &str) -> Result<Effect, ConfigError> {
        self.mint(name, None)
    }

    /// Mint an effect for the named method with a payload mapper bound to
    /// this call site.
    ///
    /// # Errors
    ///
    /// Fails with [`ConfigError::UnknownMethod`] when `name` was never
    /// configured.
    pub fn instance_with(
        &self,
        name: &str,
        mapper: impl Fn(Value) -> Value + 'static,
    ) -> Result<Effect, ConfigError> {
        self.mint(name, Some(Rc::new(mapper)))
    }

    /// Method names in declaration order.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Whether `name` is a configured method.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    fn mint(
        &self,
        name: &str,
        mapper: Option<Rc<dyn Fn(Value) -> Value>>,
    ) -> Result<Effect, ConfigError> {
        let method = self
            .methods
            .get(name)
            .ok_or_else(|| ConfigError::UnknownMethod {
                name: name.to_owned(),
            })?;
        tracing::debug!(target: "rill::catalog", method = name, "instance minted");
        Ok(Effect::from_parts(
            Some(name.to_owned()),
            Rc::clone(&method.handler),
            mapper,
            method.payload_spec.clone(),
            method.common.clone(),
        ))
    }
}

/// Builder for [`Catalog`].
#[derive(Debug)]
pub struct CatalogBuilder {
    methods: IndexMap<String, Method>,
}

impl CatalogBuilder {
    /// Register a named method. Re-registering a name replaces it.
    #[must_use]
    pub fn method(mut self, name: impl Into<String>, method: Method) -> Self {
        self.methods.insert(name.into(), method);
        self
    }

    /// Finish the catalog.
    ///
    /// # Errors
    ///
    /// Fails with [`ExpectError::MissingRequired`] when no method was
    /// registered.
    pub fn build(self) -> Result<Catalog, ConfigError> {
        if self.methods.is_empty() {
            return Err(ExpectError::MissingRequired {
                name: "methods".to_owned(),
            }
            .into());
        }
        Ok(Catalog {
            methods: self.methods,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
