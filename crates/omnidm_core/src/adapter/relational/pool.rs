//! A blocking, bounded pool of relational connections built on `r2d2`.

use omnidm_driver::{DriverError, DriverResult, SqlConnection, SqlConnector};
use parking_lot::{Mutex, RwLock};
use r2d2::event::{AcquireEvent, CheckinEvent, CheckoutEvent, ReleaseEvent, TimeoutEvent};
use r2d2::{HandleError, HandleEvent, ManageConnection};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// A driver connection plus the flag that keeps it out of the pool.
pub struct ManagedConnection {
    conn: Box<dyn SqlConnection>,
    broken: bool,
}

/// Opens pooled connections through a [`SqlConnector`].
///
/// The last failed connect is kept so a checkout that times out can
/// report the driver's classified error instead of a bare timeout.
struct ConnectorManager {
    connector: Arc<dyn SqlConnector>,
    connect_timeout: Duration,
    last_error: Arc<Mutex<Option<DriverError>>>,
}

impl ManageConnection for ConnectorManager {
    type Connection = ManagedConnection;
    type Error = DriverError;

    fn connect(&self) -> Result<ManagedConnection, DriverError> {
        match self.connector.connect(self.connect_timeout) {
            Ok(conn) => Ok(ManagedConnection { conn, broken: false }),
            Err(e) => {
                *self.last_error.lock() = Some(e.clone());
                Err(e)
            }
        }
    }

    fn is_valid(&self, conn: &mut ManagedConnection) -> Result<(), DriverError> {
        conn.conn.ping()
    }

    fn has_broken(&self, conn: &mut ManagedConnection) -> bool {
        conn.broken
    }
}

#[derive(Debug)]
struct TracingEvents {
    driver: String,
}

impl HandleEvent for TracingEvents {
    fn handle_acquire(&self, event: AcquireEvent) {
        trace!(driver = %self.driver, id = event.connection_id(), "opened connection");
    }

    fn handle_release(&self, event: ReleaseEvent) {
        trace!(driver = %self.driver, id = event.connection_id(), "closed connection");
    }

    fn handle_checkout(&self, event: CheckoutEvent) {
        trace!(
            driver = %self.driver,
            id = event.connection_id(),
            waited_us = event.duration().as_micros() as u64,
            "checked out connection"
        );
    }

    fn handle_timeout(&self, _event: TimeoutEvent) {
        trace!(driver = %self.driver, "checkout timed out");
    }

    fn handle_checkin(&self, event: CheckinEvent) {
        trace!(
            driver = %self.driver,
            id = event.connection_id(),
            held_us = event.duration().as_micros() as u64,
            "returned connection"
        );
    }
}

#[derive(Debug)]
struct WarnOnConnectError {
    driver: String,
}

impl HandleError<DriverError> for WarnOnConnectError {
    fn handle_error(&self, error: DriverError) {
        warn!(driver = %self.driver, %error, "connection attempt failed");
    }
}

/// Hands out at most `max_size` connections, each to one caller at a time.
///
/// Connections are opened on demand and kept until they break or the
/// pool is closed; they never expire while idle, since an in-memory
/// SQLite database lives only as long as its connection. A caller that
/// finds the pool at capacity waits for a return until the connect
/// timeout or its deadline, whichever is sooner.
pub struct SqlPool {
    driver: String,
    max_size: usize,
    connect_timeout: Duration,
    inner: RwLock<Option<r2d2::Pool<ConnectorManager>>>,
    last_error: Arc<Mutex<Option<DriverError>>>,
}

impl SqlPool {
    /// Creates an empty pool.
    pub fn new(connector: Arc<dyn SqlConnector>, max_size: usize, connect_timeout: Duration) -> Self {
        let driver = connector.name().to_string();
        let max_size = max_size.max(1);
        let connect_timeout = connect_timeout.max(Duration::from_millis(1));
        let last_error = Arc::new(Mutex::new(None));
        let manager = ConnectorManager {
            connector,
            connect_timeout,
            last_error: Arc::clone(&last_error),
        };
        let pool = r2d2::Pool::builder()
            .max_size(u32::try_from(max_size).unwrap_or(u32::MAX))
            .min_idle(Some(0))
            .max_lifetime(None)
            .idle_timeout(None)
            .test_on_check_out(false)
            .connection_timeout(connect_timeout)
            .error_handler(Box::new(WarnOnConnectError { driver: driver.clone() }))
            .event_handler(Box::new(TracingEvents { driver: driver.clone() }))
            .build_unchecked(manager);
        Self {
            driver,
            max_size,
            connect_timeout,
            inner: RwLock::new(Some(pool)),
            last_error,
        }
    }

    /// Opens one connection up front so configuration errors surface early.
    ///
    /// # Errors
    ///
    /// Returns the connector's error.
    pub fn warm(&self) -> DriverResult<()> {
        let conn = self.checkout(None)?;
        drop(conn);
        Ok(())
    }

    /// Takes a connection, opening one if the pool has room.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Timeout`] if `deadline` passes while waiting,
    /// the connector's error if connecting keeps failing, a transient
    /// error if the pool stays exhausted for the connect timeout, or
    /// [`DriverError::Closed`] after [`SqlPool::close`].
    pub fn checkout(&self, deadline: Option<Instant>) -> DriverResult<PooledConnection> {
        let pool = self.inner.read().clone().ok_or(DriverError::Closed)?;
        let now = Instant::now();
        let wait = deadline.map_or(self.connect_timeout, |d| {
            d.saturating_duration_since(now).min(self.connect_timeout)
        });
        if wait.is_zero() {
            return Err(DriverError::Timeout);
        }
        match pool.get_timeout(wait) {
            Ok(conn) => Ok(PooledConnection(conn)),
            Err(_) if self.inner.read().is_none() => Err(DriverError::Closed),
            Err(_) if deadline.is_some_and(|d| Instant::now() >= d) => Err(DriverError::Timeout),
            Err(e) => Err(self.last_error.lock().take().unwrap_or_else(|| {
                DriverError::transient(format!("all {} connections are in use: {e}", self.max_size))
            })),
        }
    }

    /// Closes idle connections and refuses further checkouts. Connections
    /// in use are closed when returned.
    pub fn close(&self) {
        let pool = self.inner.write().take();
        drop(pool);
    }

    /// Connections currently open, idle or checked out.
    pub fn open_count(&self) -> usize {
        self.inner
            .read()
            .as_ref()
            .map_or(0, |p| p.state().connections as usize)
    }

    /// Idle connections ready for reuse.
    pub fn idle_count(&self) -> usize {
        self.inner
            .read()
            .as_ref()
            .map_or(0, |p| p.state().idle_connections as usize)
    }

    /// Capacity.
    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

impl fmt::Debug for SqlPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlPool")
            .field("driver", &self.driver)
            .field("max_size", &self.max_size)
            .field("open", &self.open_count())
            .finish_non_exhaustive()
    }
}

/// A checked-out connection, returned to its pool on drop.
///
/// It owns its slot, so it may outlive the borrow that produced it; a
/// lazy result cursor keeps one until it is exhausted or dropped.
pub struct PooledConnection(r2d2::PooledConnection<ConnectorManager>);

impl PooledConnection {
    /// Discards the connection instead of returning it.
    pub fn poison(&mut self) {
        self.0.broken = true;
    }
}

impl Deref for PooledConnection {
    type Target = dyn SqlConnection;

    fn deref(&self) -> &Self::Target {
        self.0.conn.as_ref()
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.conn.as_mut()
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("broken", &self.0.broken)
            .finish()
    }
}
