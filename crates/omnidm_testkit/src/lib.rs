//! # omnidm Testkit
//!
//! Test utilities for omnidm.
//!
//! This crate provides:
//! - Sample entities and registries wired to both reference backends
//! - Property-based generators for logical values, records and filters
//! - Concurrent load helpers
//!
//! ## Usage
//!
//! ```rust
//! use omnidm_testkit::prelude::*;
//! use omnidm_core::query::Query;
//!
//! with_each_backend(|backend, registry| {
//!     let users = registry.session::<User>(backend);
//!     users.save(User::new(1, "a", 30, true)).unwrap();
//!     assert_eq!(users.count(Query::all()).unwrap(), 1);
//! });
//! ```

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
