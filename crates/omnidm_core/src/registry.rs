//! Named backends and their connections.

use crate::adapter::{Adapter, DocumentAdapter, RelationalAdapter, SqlPool};
use crate::config::{BackendConfig, StoreKind};
use crate::descriptor::Entity;
use crate::error::{OdmError, OdmResult};
use crate::session::Session;
use omnidm_codec::CodecRegistry;
use omnidm_driver::{DocumentDriver, MemoryDocumentStore, SqlConnector, SqliteConnector};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

struct Backend {
    adapter: Arc<dyn Adapter>,
    config: BackendConfig,
}

/// Owns the connections of every configured backend.
///
/// A registry is created at application start, hands out [`Session`]s
/// that share its connections, and closes them on [`shutdown`] or drop.
/// Sessions opened from it fail with [`OdmError::RegistryClosed`] once it
/// is shut down.
///
/// [`shutdown`]: ConnectionRegistry::shutdown
///
/// # Example
///
/// ```rust
/// use omnidm_core::{BackendConfig, ConnectionRegistry};
///
/// let registry = ConnectionRegistry::new();
/// registry.open("docs", BackendConfig::memory()).unwrap();
/// registry.open("sql", BackendConfig::from_uri("sqlite::memory:").unwrap()).unwrap();
/// assert_eq!(registry.backends(), vec!["docs".to_string(), "sql".to_string()]);
/// registry.shutdown();
/// ```
pub struct ConnectionRegistry {
    backends: RwLock<HashMap<String, Backend>>,
    codecs: CodecRegistry,
    ensured: Mutex<HashSet<(String, String)>>,
    is_open: RwLock<bool>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    /// Creates an empty registry with the built-in codecs.
    #[must_use]
    pub fn new() -> Self {
        Self::with_codecs(CodecRegistry::new())
    }

    /// Creates an empty registry that checks entities against `codecs`.
    #[must_use]
    pub fn with_codecs(codecs: CodecRegistry) -> Self {
        Self {
            backends: RwLock::new(HashMap::new()),
            codecs,
            ensured: Mutex::new(HashSet::new()),
            is_open: RwLock::new(true),
        }
    }

    fn ensure_open(&self) -> OdmResult<()> {
        if *self.is_open.read() {
            Ok(())
        } else {
            Err(OdmError::RegistryClosed)
        }
    }

    /// Connects to a backend with a bundled driver and registers it as
    /// `name`.
    ///
    /// The in-process document store and SQLite are bundled. MongoDB,
    /// MySQL and PostgreSQL need an application-supplied driver; see
    /// [`ConnectionRegistry::register_document`] and
    /// [`ConnectionRegistry::register_relational`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid options, a taken name or
    /// a store without a bundled driver, or the driver's error if the
    /// first connection fails.
    pub fn open(&self, name: &str, config: BackendConfig) -> OdmResult<()> {
        config.validate()?;
        match config.kind {
            StoreKind::Memory => self.register_document(name, Arc::new(MemoryDocumentStore::new()), config),
            StoreKind::Sqlite => {
                let connector = if config.is_sqlite_memory() {
                    SqliteConnector::memory()
                } else {
                    let path = config.database.clone().unwrap_or_default();
                    SqliteConnector::file(path)
                };
                let connector = connector.with_busy_timeout(config.connect_timeout);
                self.register_relational(name, Arc::new(connector), config)
            }
            StoreKind::Mongo | StoreKind::Mysql | StoreKind::Postgres => Err(OdmError::configuration(format!(
                "{} needs an application-supplied driver; register one for `{name}`",
                config.kind.scheme()
            ))),
        }
    }

    /// Registers a document backend served by `driver`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid, not a
    /// document store, or `name` is taken.
    pub fn register_document(
        &self,
        name: &str,
        driver: Arc<dyn DocumentDriver>,
        config: BackendConfig,
    ) -> OdmResult<()> {
        config.validate()?;
        if config.kind.dialect().is_some() {
            return Err(OdmError::configuration(format!(
                "`{name}` is configured as {}, not a document store",
                config.kind.scheme()
            )));
        }
        let adapter = DocumentAdapter::new(name, driver, config.retry.clone());
        self.insert(name, Arc::new(adapter), config)
    }

    /// Registers a relational backend whose connections come from
    /// `connector`. One connection is opened immediately.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid, not a
    /// relational store, or `name` is taken, or the connector's error.
    pub fn register_relational(
        &self,
        name: &str,
        connector: Arc<dyn SqlConnector>,
        config: BackendConfig,
    ) -> OdmResult<()> {
        config.validate()?;
        let dialect = config.kind.dialect().ok_or_else(|| {
            OdmError::configuration(format!(
                "`{name}` is configured as {}, not a relational store",
                config.kind.scheme()
            ))
        })?;
        let pool = SqlPool::new(connector, config.pool_size, config.connect_timeout);
        pool.warm().map_err(|e| OdmError::from_driver(name, "connect", e))?;
        let adapter =
            RelationalAdapter::new(name, dialect, pool, config.retry.clone()).with_fetch_size(config.fetch_size);
        self.insert(name, Arc::new(adapter), config)
    }

    /// Registers a ready-made adapter.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `name` is taken.
    pub fn register_adapter(&self, name: &str, adapter: Arc<dyn Adapter>, config: BackendConfig) -> OdmResult<()> {
        config.validate()?;
        self.insert(name, adapter, config)
    }

    fn insert(&self, name: &str, adapter: Arc<dyn Adapter>, config: BackendConfig) -> OdmResult<()> {
        self.ensure_open()?;
        let mut backends = self.backends.write();
        if backends.contains_key(name) {
            adapter.close();
            return Err(OdmError::configuration(format!("backend `{name}` is already registered")));
        }
        info!(
            backend = name,
            store = config.kind.scheme(),
            pool_size = config.pool_size,
            "registered backend"
        );
        backends.insert(name.to_string(), Backend { adapter, config });
        Ok(())
    }

    /// Opens a session for entity `T` on backend `name`.
    ///
    /// The entity's descriptor is built (once per type) and every field
    /// type is checked against the backend's codecs. With
    /// `create_schema` set, the entity's table is created the first time
    /// a session for it is opened.
    ///
    /// # Errors
    ///
    /// Returns [`OdmError::RegistryClosed`] after shutdown,
    /// [`OdmError::UnknownBackend`] for an unregistered name, an invalid
    /// entity definition error, an unsupported type error, or the
    /// backend's error if creating the table fails.
    pub fn session<T: Entity>(&self, name: &str) -> OdmResult<Session<T>> {
        self.ensure_open()?;
        let (adapter, config) = {
            let backends = self.backends.read();
            let backend = backends.get(name).ok_or_else(|| OdmError::unknown_backend(name))?;
            (Arc::clone(&backend.adapter), backend.config.clone())
        };
        let session = Session::<T>::new(Arc::clone(&adapter), config.query_timeout)?;
        let descriptor = session.descriptor();
        for field in descriptor.fields() {
            self.codecs.check(adapter.kind(), field.logical_type())?;
        }

        if config.create_schema {
            let key = (name.to_string(), descriptor.collection().to_string());
            if !self.ensured.lock().contains(&key) {
                session.ensure_schema()?;
                debug!(backend = name, collection = %key.1, "schema ensured");
                self.ensured.lock().insert(key);
            }
        }
        Ok(session)
    }

    /// The adapter behind backend `name`.
    ///
    /// # Errors
    ///
    /// Returns [`OdmError::UnknownBackend`] or [`OdmError::RegistryClosed`].
    pub fn adapter(&self, name: &str) -> OdmResult<Arc<dyn Adapter>> {
        self.ensure_open()?;
        self.backends
            .read()
            .get(name)
            .map(|b| Arc::clone(&b.adapter))
            .ok_or_else(|| OdmError::unknown_backend(name))
    }

    /// Registered backend names, sorted.
    #[must_use]
    pub fn backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Checks that backend `name` is reachable.
    ///
    /// # Errors
    ///
    /// Returns the classified driver error.
    pub fn ping(&self, name: &str) -> OdmResult<()> {
        self.adapter(name)?.ping()
    }

    /// Whether the registry still accepts work.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.is_open.read()
    }

    /// Closes every backend's connections. Idempotent.
    pub fn shutdown(&self) {
        let mut is_open = self.is_open.write();
        if !*is_open {
            return;
        }
        *is_open = false;
        let backends = std::mem::take(&mut *self.backends.write());
        for (name, backend) in backends {
            backend.adapter.close();
            info!(backend = %name, "closed backend");
        }
        self.ensured.lock().clear();
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("is_open", &self.is_open())
            .field("backends", &self.backends())
            .finish_non_exhaustive()
    }
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
