//! Effective monitoring configuration for a device.
//!
//! Templates inherit from a single parent and are attached to devices either
//! through host groups (priority 0) or directly (stored priority + 100). The
//! [`resolver::ConfigResolver`] walks those relationships over an immutable,
//! id-indexed [`catalog::Catalog`] snapshot, so any number of callers can
//! resolve concurrently without touching the store.

pub mod catalog;
pub mod error;
pub mod resolver;

#[cfg(test)]
mod tests;

pub use catalog::Catalog;
pub use error::ResolveError;
pub use resolver::{ConfigResolver, EffectiveConfig, MAX_INHERITANCE_DEPTH};
