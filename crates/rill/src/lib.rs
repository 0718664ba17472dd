#![forbid(unsafe_code)]

//! Rill public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub mod prelude {
    pub use rill_core as core;
    pub use rill_effect as effect;
    pub use rill_store as store;
}
