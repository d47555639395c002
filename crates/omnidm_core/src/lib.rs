//! # omnidm Core
//!
//! Persist plain Rust types to document and relational stores through one
//! API.
//!
//! This crate provides:
//! - [`Entity`] declarations and cached [`EntityDescriptor`]s
//! - A backend-neutral [`query`] model with validation
//! - [`adapter`]s translating queries into BSON filters or dialect SQL
//! - Typed [`Session`]s with lazy cursors
//! - A [`ConnectionRegistry`] owning connections and pools
//!
//! ## Usage
//!
//! ```rust
//! use omnidm_core::query::{eq, Query};
//! use omnidm_core::{BackendConfig, ConnectionRegistry, DescriptorBuilder, Entity};
//! use omnidm_codec::{CodecResult, FieldDescriptor, Record};
//!
//! #[derive(Debug, PartialEq)]
//! struct City {
//!     name: String,
//!     country: String,
//! }
//!
//! impl Entity for City {
//!     fn define(builder: DescriptorBuilder) -> DescriptorBuilder {
//!         builder
//!             .field(FieldDescriptor::text("name").primary_key())
//!             .field(FieldDescriptor::text("country"))
//!     }
//!     fn to_record(&self) -> Record {
//!         Record::new().with("name", &self.name).with("country", &self.country)
//!     }
//!     fn from_record(r: Record) -> CodecResult<Self> {
//!         Ok(Self { name: r.field("name")?, country: r.field("country")? })
//!     }
//! }
//!
//! let registry = ConnectionRegistry::new();
//! registry.open("docs", BackendConfig::memory()).unwrap();
//! registry.open("sql", BackendConfig::sqlite_memory()).unwrap();
//!
//! for backend in ["docs", "sql"] {
//!     let cities = registry.session::<City>(backend).unwrap();
//!     cities.save(City { name: "Lyon".into(), country: "FR".into() }).unwrap();
//!     let found = cities.find_one(eq("country", "FR")).unwrap();
//!     assert_eq!(found.map(|c| c.name), Some("Lyon".to_string()));
//!     assert_eq!(cities.count(Query::all()).unwrap(), 1);
//! }
//! ```

pub mod adapter;
mod config;
mod descriptor;
mod error;
pub mod query;
mod registry;
mod retry;
mod session;

pub use adapter::{Adapter, Dialect, RecordCursor};
pub use config::{BackendConfig, Credentials, StoreKind};
pub use descriptor::{describe, DescriptorBuilder, DescriptorCache, Entity, EntityDescriptor, DOCUMENT_ID_KEY};
pub use error::{OdmError, OdmResult, QueryProblem};
pub use registry::ConnectionRegistry;
pub use retry::RetryPolicy;
pub use session::{CallOptions, EntityCursor, SaveMode, SaveOutcome, Session};

pub use omnidm_codec::{CodecRegistry, FieldDescriptor, LogicalType, Record, Shape, Timestamp, Value};
