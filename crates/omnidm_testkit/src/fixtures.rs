//! Sample entities and registries wired to the reference backends.

use omnidm_codec::{
    Bytes, CodecResult, FieldDescriptor, LogicalType, Record, Shape, Timestamp, Uuid, Value,
};
use omnidm_core::{
    BackendConfig, ConnectionRegistry, DescriptorBuilder, Entity, RetryPolicy, Session,
};
use omnidm_driver::MemoryDocumentStore;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Name of the in-process document backend.
pub const DOCUMENT: &str = "docs";
/// Name of the SQLite backend.
pub const RELATIONAL: &str = "sql";
/// Every backend a [`TestRegistry`] registers.
pub const BACKENDS: [&str; 2] = [DOCUMENT, RELATIONAL];

/// A flat entity covering the common scalar types.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// Primary key.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Age in years.
    pub age: i64,
    /// Whether the account is enabled.
    pub active: bool,
}

impl User {
    /// Creates a user.
    pub fn new(id: i64, name: impl Into<String>, age: i64, active: bool) -> Self {
        Self {
            id,
            name: name.into(),
            age,
            active,
        }
    }
}

impl Entity for User {
    fn define(builder: DescriptorBuilder) -> DescriptorBuilder {
        builder
            .collection("users")
            .field(FieldDescriptor::integer("id").primary_key())
            .field(FieldDescriptor::text("name"))
            .field(FieldDescriptor::integer("age"))
            .field(FieldDescriptor::boolean("active"))
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("name", &self.name)
            .with("age", self.age)
            .with("active", self.active)
    }

    fn from_record(record: Record) -> CodecResult<Self> {
        Ok(Self {
            id: record.field("id")?,
            name: record.field("name")?,
            age: record.field("age")?,
            active: record.field("active")?,
        })
    }
}

/// A postal address, embedded in [`Profile`].
#[derive(Debug, Clone, PartialEq)]
pub struct Address {
    /// Street line.
    pub street: String,
    /// City.
    pub city: String,
    /// Postal code, if known.
    pub zip: Option<String>,
}

impl Address {
    /// The nested record layout.
    pub fn shape() -> Shape {
        Shape::new(
            "Address",
            vec![
                FieldDescriptor::text("street"),
                FieldDescriptor::text("city"),
                FieldDescriptor::text("zip").nullable(),
            ],
        )
    }

    /// The address as a nested record.
    pub fn to_record(&self) -> Record {
        Record::new()
            .with("street", &self.street)
            .with("city", &self.city)
            .with("zip", self.zip.clone())
    }

    fn from_record(record: &Record) -> CodecResult<Self> {
        Ok(Self {
            street: record.field("street")?,
            city: record.field("city")?,
            zip: record.field("zip")?,
        })
    }
}

/// An entity using every logical type, including nested records and
/// sequences.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    /// Primary key.
    pub handle: Uuid,
    /// Display name, stored as `display`.
    pub display_name: String,
    /// Ranking score.
    pub score: f64,
    /// Sign-up time.
    pub joined: Timestamp,
    /// Current address.
    pub address: Address,
    /// Earlier addresses, most recent first.
    pub previous: Vec<Address>,
    /// Free-form labels.
    pub tags: Vec<String>,
    /// Avatar image bytes.
    pub avatar: Option<Bytes>,
}

impl Entity for Profile {
    fn define(builder: DescriptorBuilder) -> DescriptorBuilder {
        builder
            .collection("profiles")
            .field(FieldDescriptor::identifier("handle").primary_key())
            .field(FieldDescriptor::text("display_name").stored_as("display"))
            .field(FieldDescriptor::float("score"))
            .field(FieldDescriptor::timestamp("joined"))
            .field(FieldDescriptor::nested("address", Address::shape()))
            .field(FieldDescriptor::sequence(
                "previous",
                LogicalType::nested(Address::shape()),
            ))
            .field(FieldDescriptor::sequence("tags", LogicalType::Text))
            .field(FieldDescriptor::binary("avatar").nullable())
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("handle", self.handle)
            .with("display_name", &self.display_name)
            .with("score", self.score)
            .with("joined", self.joined)
            .with("address", self.address.to_record())
            .with(
                "previous",
                Value::sequence(self.previous.iter().map(Address::to_record)),
            )
            .with("tags", Value::sequence(self.tags.iter().cloned()))
            .with("avatar", self.avatar.clone())
    }

    fn from_record(record: Record) -> CodecResult<Self> {
        let address: Record = record.field("address")?;
        let previous: Vec<Record> = record.field("previous")?;
        Ok(Self {
            handle: record.field("handle")?,
            display_name: record.field("display_name")?,
            score: record.field("score")?,
            joined: record.field("joined")?,
            address: Address::from_record(&address)?,
            previous: previous
                .iter()
                .map(Address::from_record)
                .collect::<CodecResult<_>>()?,
            tags: record.field("tags")?,
            avatar: record.field("avatar")?,
        })
    }
}

/// An entity whose `value` is declared as an integer but may hold any
/// logical value, for exercising conversion failures.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Primary key.
    pub id: i64,
    /// Declared integer; not checked on construction.
    pub value: Value,
}

impl Entity for Reading {
    fn define(builder: DescriptorBuilder) -> DescriptorBuilder {
        builder
            .collection("readings")
            .field(FieldDescriptor::integer("id").primary_key())
            .field(FieldDescriptor::integer("value"))
    }

    fn to_record(&self) -> Record {
        Record::new().with("id", self.id).with("value", self.value.clone())
    }

    fn from_record(record: Record) -> CodecResult<Self> {
        Ok(Self {
            id: record.field("id")?,
            value: record.get_or_null("value").clone(),
        })
    }
}

/// A retry policy with millisecond backoff, for tests.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3)
        .with_initial_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(5))
        .with_jitter(false)
}

/// A registry with the in-process document store as [`DOCUMENT`] and
/// SQLite as [`RELATIONAL`].
///
/// The document store is kept so tests can inject faults into it.
pub struct TestRegistry {
    /// The registry.
    pub registry: ConnectionRegistry,
    store: Arc<MemoryDocumentStore>,
    _temp_dir: Option<TempDir>,
}

impl TestRegistry {
    /// Both backends in memory.
    pub fn memory() -> Self {
        Self::build(BackendConfig::sqlite_memory(), None)
    }

    /// SQLite in a temporary file with a pool of `pool_size`, so several
    /// connections can be open at once.
    pub fn file(pool_size: usize) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("omnidm.db");
        let config = BackendConfig::sqlite_file(path.to_string_lossy()).with_pool_size(pool_size);
        Self::build(config, Some(temp_dir))
    }

    fn build(sql: BackendConfig, temp_dir: Option<TempDir>) -> Self {
        let registry = ConnectionRegistry::new();
        let store = Arc::new(MemoryDocumentStore::new());
        registry
            .register_document(
                DOCUMENT,
                store.clone(),
                BackendConfig::memory().with_retry(fast_retry()),
            )
            .expect("Failed to register document backend");
        registry
            .open(RELATIONAL, sql.with_retry(fast_retry()))
            .expect("Failed to open SQLite backend");
        Self {
            registry,
            store,
            _temp_dir: temp_dir,
        }
    }

    /// Opens a session, panicking on failure.
    pub fn session<T: Entity>(&self, backend: &str) -> Session<T> {
        self.registry
            .session::<T>(backend)
            .expect("Failed to open session")
    }

    /// The document store behind [`DOCUMENT`].
    pub fn store(&self) -> &MemoryDocumentStore {
        &self.store
    }
}

impl std::ops::Deref for TestRegistry {
    type Target = ConnectionRegistry;

    fn deref(&self) -> &Self::Target {
        &self.registry
    }
}

/// Runs `f` once per backend, each time with a fresh in-memory registry.
pub fn with_each_backend<F>(mut f: F)
where
    F: FnMut(&str, &TestRegistry),
{
    for backend in BACKENDS {
        let registry = TestRegistry::memory();
        f(backend, &registry);
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// `count` users with ids `1..=count`, ages `20, 25, 30, ...` and every
    /// third one inactive.
    pub fn users(count: usize) -> Vec<User> {
        (1..=count as i64)
            .map(|i| User::new(i, format!("user{i}"), 15 + 5 * i, i % 3 != 0))
            .collect()
    }

    /// Inserts [`users`] through `session` and returns them.
    pub fn seeded_users(session: &Session<User>, count: usize) -> Vec<User> {
        let users = users(count);
        session.insert_many(&users).expect("Failed to seed users");
        users
    }

    /// A fully populated profile.
    pub fn profile(seed: u8) -> Profile {
        Profile {
            handle: Uuid::from_bytes([seed; 16]),
            display_name: format!("profile {seed}"),
            score: f64::from(seed) * 1.5,
            joined: Timestamp::from_millis(1_700_000_000_000 + i64::from(seed)),
            address: Address {
                street: "1 Main St".into(),
                city: "Springfield".into(),
                zip: Some("12345".into()),
            },
            previous: vec![Address {
                street: "9 Elm St".into(),
                city: "Shelbyville".into(),
                zip: None,
            }],
            tags: vec!["a".into(), "b".into()],
            avatar: Some(Bytes::from(vec![seed, 0, 255])),
        }
    }
}
