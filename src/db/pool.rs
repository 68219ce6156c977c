//! Bounded connection pool for the embedded SQLite backend.
//!
//! Connections are grouped by [`PoolKey`] (location + access mode) and each
//! key holds at most `max_per_key` live handles. Callers borrow a handle for
//! the duration of one statement through a [`PooledConnection`] guard, which
//! hands the connection back when dropped.
//!
//! # Concurrency
//!
//! - All bookkeeping lives behind one `std::sync::Mutex` that is never held
//!   across an await point. "Check capacity" and "register new handle" happen
//!   in the same critical section, so concurrent acquirers cannot overshoot.
//! - A slot is reserved (marked in use, no connection yet) before the
//!   connection is opened outside the lock. If opening fails or the acquire
//!   future is dropped, the reservation is rolled back.
//! - Waiters re-check on a short poll interval and are also woken early
//!   through a [`Notify`] whenever a handle is returned or removed.
//! - A background reaper closes handles idle longer than the idle timeout.
//!   It holds a `Weak` reference and exits once the pool is dropped.

use crate::config::PoolConfig;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionDescriptor, DatabaseType, MEMORY_LOCATION};
use schemars::JsonSchema;
use serde::Serialize;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqliteSynchronous,
};
use sqlx::{ConnectOptions, Connection};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const EXPECT_MSG: &str = "BUG: pooled connection already returned";

/// Pool partition: one file (or `:memory:`) opened in one mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub location: String,
    pub read_only: bool,
}

impl PoolKey {
    /// Derive the pool key for a SQLite descriptor.
    pub fn for_descriptor(descriptor: &ConnectionDescriptor) -> Self {
        Self {
            location: descriptor.location.clone(),
            read_only: descriptor.read_only,
        }
    }

    fn is_memory(&self) -> bool {
        self.location == MEMORY_LOCATION
    }
}

impl std::fmt::Display for PoolKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = if self.read_only { "ro" } else { "rw" };
        write!(f, "{} ({})", self.location, mode)
    }
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, JsonSchema)]
pub struct PoolStats {
    pub keys: usize,
    pub total: usize,
    pub in_use: usize,
    pub idle: usize,
}

/// One tracked handle. `conn` is `None` while borrowed or still opening.
struct Slot {
    id: u64,
    conn: Option<SqliteConnection>,
    in_use: bool,
    last_used: Instant,
}

#[derive(Default)]
struct PoolState {
    slots: HashMap<PoolKey, Vec<Slot>>,
    next_id: u64,
    closed: bool,
}

enum Checkout {
    Idle(u64, SqliteConnection),
    Reserved(u64),
    Full,
}

/// Pool manager for SQLite connections.
///
/// Construct one per process and pass it to the dispatcher and the schema
/// introspector; call [`shutdown`](Self::shutdown) during teardown.
pub struct SqlitePoolManager {
    config: PoolConfig,
    state: Mutex<PoolState>,
    released: Notify,
    /// Reaper task handle. Uses std::sync::Mutex for synchronous storage.
    reaper_handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SqlitePoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlitePoolManager")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl SqlitePoolManager {
    /// Create a pool and start its idle reaper.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: PoolConfig) -> Arc<Self> {
        let manager = Arc::new(Self {
            config,
            state: Mutex::new(PoolState::default()),
            released: Notify::new(),
            reaper_handle: Mutex::new(None),
        });

        // Weak reference so the task does not keep the pool alive
        let weak_manager = Arc::downgrade(&manager);
        let interval = manager.config.reap_interval;
        let idle_timeout = manager.config.idle_timeout;
        let handle = tokio::spawn(async move {
            Self::reaper_task(weak_manager, interval, idle_timeout).await;
        });
        *lock(&manager.reaper_handle) = Some(handle);

        manager
    }

    /// Borrow a connection using the configured acquire timeout.
    pub async fn acquire(
        self: &Arc<Self>,
        descriptor: &ConnectionDescriptor,
    ) -> DbResult<PooledConnection> {
        self.acquire_with_timeout(descriptor, self.config.acquire_timeout)
            .await
    }

    /// Borrow a connection, waiting at most `timeout` for one to free up.
    ///
    /// Reuses an idle handle if one exists, otherwise opens a new one while
    /// the key is below capacity, otherwise waits. Fails with
    /// [`DbError::PoolTimeout`] when the timeout elapses.
    pub async fn acquire_with_timeout(
        self: &Arc<Self>,
        descriptor: &ConnectionDescriptor,
        timeout: Duration,
    ) -> DbResult<PooledConnection> {
        if descriptor.db_type != DatabaseType::SQLite {
            return Err(DbError::invalid_input(format!(
                "{} targets are not pooled",
                descriptor.db_type
            )));
        }

        let key = PoolKey::for_descriptor(descriptor);
        let started = Instant::now();

        loop {
            // Register interest before checking so a release between the
            // check and the wait is not missed.
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_checkout(&key)? {
                Checkout::Idle(slot_id, conn) => {
                    debug!(pool_key = %key, slot_id, "Reusing idle connection");
                    return Ok(PooledConnection::new(Arc::clone(self), key, slot_id, conn));
                }
                Checkout::Reserved(slot_id) => {
                    let mut reservation = Reservation {
                        manager: self.as_ref(),
                        key: &key,
                        slot_id,
                        armed: true,
                    };
                    let conn = self.open(&key).await?;
                    reservation.armed = false;
                    drop(reservation);
                    debug!(pool_key = %key, slot_id, "Opened new connection");
                    return Ok(PooledConnection::new(Arc::clone(self), key, slot_id, conn));
                }
                Checkout::Full => {
                    let elapsed = started.elapsed();
                    if elapsed >= timeout {
                        let elapsed_ms = elapsed.as_millis() as u64;
                        warn!(pool_key = %key, elapsed_ms, "Connection acquire timed out");
                        return Err(DbError::pool_timeout(elapsed_ms));
                    }
                    let wait = self.config.poll_interval.min(timeout - elapsed);
                    let _ = tokio::time::timeout(wait, notified).await;
                }
            }
        }
    }

    /// Return a borrowed connection to the pool.
    ///
    /// Equivalent to dropping the guard; the connection stays open.
    pub fn release(&self, handle: PooledConnection) {
        drop(handle);
    }

    /// Close idle handles unused for longer than `idle_timeout`.
    ///
    /// Keys left without handles are removed. Returns the number closed.
    pub async fn reap_idle(&self, idle_timeout: Duration) -> usize {
        // Collect under the lock, close outside it
        let victims: Vec<(PoolKey, SqliteConnection)> = {
            let mut state = lock(&self.state);
            let now = Instant::now();
            let mut victims = Vec::new();
            state.slots.retain(|key, slots| {
                slots.retain_mut(|slot| {
                    let expired = !slot.in_use
                        && now.saturating_duration_since(slot.last_used) > idle_timeout;
                    if !expired {
                        return true;
                    }
                    if let Some(conn) = slot.conn.take() {
                        victims.push((key.clone(), conn));
                    }
                    false
                });
                !slots.is_empty()
            });
            victims
        };

        if victims.is_empty() {
            return 0;
        }
        self.released.notify_waiters();

        let count = victims.len();
        for (key, conn) in victims {
            debug!(pool_key = %key, "Closing idle connection");
            if let Err(e) = conn.close().await {
                warn!(pool_key = %key, error = %e, "Failed to close idle connection");
            }
        }
        count
    }

    /// Stop the reaper and close every tracked connection.
    ///
    /// Close errors are logged and swallowed. Handles still borrowed are
    /// closed when their guard drops. Later acquires fail. Idempotent.
    pub async fn shutdown(&self) {
        if let Some(handle) = lock(&self.reaper_handle).take() {
            handle.abort();
        }

        let conns: Vec<(PoolKey, SqliteConnection)> = {
            let mut state = lock(&self.state);
            state.closed = true;
            state
                .slots
                .drain()
                .flat_map(|(key, slots)| {
                    slots
                        .into_iter()
                        .filter_map(move |slot| slot.conn.map(|c| (key.clone(), c)))
                })
                .collect()
        };
        self.released.notify_waiters();

        let count = conns.len();
        for (key, conn) in conns {
            if let Err(e) = conn.close().await {
                debug!(pool_key = %key, error = %e, "Ignoring close error during shutdown");
            }
        }
        if count > 0 {
            info!(closed = count, "SQLite pool shut down");
        }
    }

    /// Occupancy across all keys.
    pub fn stats(&self) -> PoolStats {
        let state = lock(&self.state);
        let mut stats = PoolStats {
            keys: state.slots.len(),
            ..PoolStats::default()
        };
        for slot in state.slots.values().flatten() {
            stats.total += 1;
            if slot.in_use {
                stats.in_use += 1;
            } else {
                stats.idle += 1;
            }
        }
        stats
    }

    /// Occupancy for one key.
    pub fn key_stats(&self, key: &PoolKey) -> PoolStats {
        let state = lock(&self.state);
        let Some(slots) = state.slots.get(key) else {
            return PoolStats::default();
        };
        let in_use = slots.iter().filter(|s| s.in_use).count();
        PoolStats {
            keys: 1,
            total: slots.len(),
            in_use,
            idle: slots.len() - in_use,
        }
    }

    fn try_checkout(&self, key: &PoolKey) -> DbResult<Checkout> {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        if state.closed {
            return Err(DbError::internal("connection pool has been shut down"));
        }

        let slots = state.slots.entry(key.clone()).or_default();
        for slot in slots.iter_mut().filter(|s| !s.in_use) {
            if let Some(conn) = slot.conn.take() {
                slot.in_use = true;
                return Ok(Checkout::Idle(slot.id, conn));
            }
        }

        if slots.len() < self.config.max_per_key {
            let id = state.next_id;
            state.next_id += 1;
            slots.push(Slot {
                id,
                conn: None,
                in_use: true,
                last_used: Instant::now(),
            });
            return Ok(Checkout::Reserved(id));
        }

        Ok(Checkout::Full)
    }

    /// Put a connection back into its slot. Called from the guard's Drop.
    fn check_in(&self, key: &PoolKey, slot_id: u64, conn: SqliteConnection) {
        let returned = {
            let mut state = lock(&self.state);
            match state
                .slots
                .get_mut(key)
                .and_then(|slots| slots.iter_mut().find(|s| s.id == slot_id))
            {
                Some(slot) => {
                    slot.conn = Some(conn);
                    slot.in_use = false;
                    slot.last_used = Instant::now();
                    true
                }
                // Pool shut down while borrowed; the connection closes on drop.
                None => false,
            }
        };
        if returned {
            self.released.notify_waiters();
        }
    }

    /// Drop a reserved slot whose connection never opened.
    fn discard(&self, key: &PoolKey, slot_id: u64) {
        {
            let mut state = lock(&self.state);
            if let Some(slots) = state.slots.get_mut(key) {
                slots.retain(|s| s.id != slot_id);
                if slots.is_empty() {
                    state.slots.remove(key);
                }
            }
        }
        self.released.notify_waiters();
    }

    async fn open(&self, key: &PoolKey) -> DbResult<SqliteConnection> {
        let mut options = if key.is_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            SqliteConnectOptions::new().filename(&key.location)
        };

        options = options
            .foreign_keys(self.config.foreign_keys)
            .busy_timeout(self.config.busy_timeout);

        if !key.read_only {
            options = options
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
        } else if !key.is_memory() {
            options = options.read_only(true);
        }

        options.connect().await.map_err(|e| {
            DbError::connection(
                DatabaseType::SQLite,
                format!("Failed to open {}: {}", key.location, e),
                "Verify the file path exists and is accessible",
            )
            .for_backend(DatabaseType::SQLite)
        })
    }

    /// Background task closing idle connections.
    ///
    /// Uses a Weak reference to the manager; exits when the manager is dropped.
    async fn reaper_task(weak_manager: Weak<Self>, interval: Duration, idle_timeout: Duration) {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let Some(manager) = weak_manager.upgrade() else {
                debug!("SQLite pool dropped, reaper exiting");
                return;
            };

            let reaped = manager.reap_idle(idle_timeout).await;
            if reaped > 0 {
                info!(reaped, "Closed idle SQLite connections");
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Rolls back a reserved slot unless disarmed.
struct Reservation<'a> {
    manager: &'a SqlitePoolManager,
    key: &'a PoolKey,
    slot_id: u64,
    armed: bool,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.manager.discard(self.key, self.slot_id);
        }
    }
}

/// Exclusive borrow of a pooled SQLite connection.
///
/// Dereferences to [`SqliteConnection`]. The connection returns to the pool
/// when the guard is dropped, on success and error paths alike.
pub struct PooledConnection {
    conn: Option<SqliteConnection>,
    manager: Arc<SqlitePoolManager>,
    key: PoolKey,
    slot_id: u64,
}

impl PooledConnection {
    fn new(
        manager: Arc<SqlitePoolManager>,
        key: PoolKey,
        slot_id: u64,
        conn: SqliteConnection,
    ) -> Self {
        Self {
            conn: Some(conn),
            manager,
            key,
            slot_id,
        }
    }

    /// Key this connection belongs to.
    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    /// Stable identifier of the underlying handle within its key.
    pub fn slot_id(&self) -> u64 {
        self.slot_id
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("key", &self.key)
            .field("slot_id", &self.slot_id)
            .finish_non_exhaustive()
    }
}

impl Deref for PooledConnection {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect(EXPECT_MSG)
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect(EXPECT_MSG)
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.manager.check_in(&self.key, self.slot_id, conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(read_only: bool) -> ConnectionDescriptor {
        ConnectionDescriptor::parse(":memory:", read_only).unwrap()
    }

    #[tokio::test]
    async fn test_acquire_and_release_updates_stats() {
        let pool = SqlitePoolManager::new(PoolConfig::default());
        let desc = memory(false);

        let conn = pool.acquire(&desc).await.unwrap();
        assert_eq!(pool.stats().in_use, 1);
        pool.release(conn);
        assert_eq!(pool.stats(), PoolStats { keys: 1, total: 1, in_use: 0, idle: 1 });

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_modes_use_separate_keys() {
        let pool = SqlitePoolManager::new(PoolConfig::default());
        let _rw = pool.acquire(&memory(false)).await.unwrap();
        let _ro = pool.acquire(&memory(true)).await.unwrap();
        assert_eq!(pool.stats().keys, 2);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_network_descriptor_rejected() {
        let pool = SqlitePoolManager::new(PoolConfig::default());
        let desc = ConnectionDescriptor::parse("postgres://localhost/db", true).unwrap();
        let err = pool.acquire(&desc).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
        assert_eq!(pool.stats().keys, 0);
    }

    #[tokio::test]
    async fn test_failed_open_rolls_back_reservation() {
        let pool = SqlitePoolManager::new(PoolConfig::default());
        let desc =
            ConnectionDescriptor::parse("/nonexistent-dir/never/here.db", true).unwrap();
        let err = pool.acquire(&desc).await.unwrap_err();
        assert!(matches!(err, DbError::Backend { .. }));
        assert_eq!(pool.stats(), PoolStats::default());
    }

    #[tokio::test]
    async fn test_acquire_after_shutdown_fails() {
        let pool = SqlitePoolManager::new(PoolConfig::default());
        pool.shutdown().await;
        pool.shutdown().await;
        assert!(pool.acquire(&memory(false)).await.is_err());
    }

    #[test]
    fn test_pool_key_display() {
        let key = PoolKey {
            location: "./a.db".to_string(),
            read_only: true,
        };
        assert_eq!(key.to_string(), "./a.db (ro)");
    }
}
