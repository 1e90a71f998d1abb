//! # Connection Pool
//!
//! Purpose: Share a fixed set of persistent connections between threads,
//! limiting in-flight commands to the pool size.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Every connection is dialed up front and lives
//!    for the lifetime of the pool.
//! 2. **Counting Semaphore**: The bounded idle queue is the only
//!    synchronization; `acquire` blocks while it is empty.
//! 3. **RAII Release**: [`PooledConnection`] returns its connection on drop,
//!    on every path.
//! 4. **Lazy Repair**: Broken connections go back into the queue and redial
//!    on their next use.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

use crate::config::{clamp_max_connections, ClientConfig, ConnectionOptions};
use crate::connection::Connection;
use crate::error::ClientResult;
use crate::reply::Reply;
use crate::resp::Arg;

/// Blocking pool of connections to one server.
pub struct ConnectionPool {
    options: Arc<ConnectionOptions>,
    max_connections: usize,
    idle: Mutex<VecDeque<Connection>>,
    available: Condvar,
}

impl ConnectionPool {
    /// Builds the pool and dials every connection eagerly.
    ///
    /// Fails on an unresolvable address, the first dial error, or a rejected
    /// AUTH handshake.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let options = Arc::new(ConnectionOptions::from_config(&config)?);
        let max_connections = clamp_max_connections(config.max_connections);

        let mut idle = VecDeque::with_capacity(max_connections);
        for _ in 0..max_connections {
            idle.push_back(Connection::open(options.clone())?);
        }
        info!(
            endpoint = ?options.endpoint,
            connections = max_connections,
            timeout_ms = options.timeout.as_millis() as u64,
            "connection pool ready"
        );

        Ok(ConnectionPool {
            options,
            max_connections,
            idle: Mutex::new(idle),
            available: Condvar::new(),
        })
    }

    /// Number of connections owned by the pool.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Options shared by every pooled connection.
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Connections currently waiting in the queue.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Blocks until a connection is free. There is no acquire timeout.
    pub fn acquire(&self) -> PooledConnection<'_> {
        let mut idle = self.idle.lock();
        loop {
            if let Some(conn) = idle.pop_front() {
                return PooledConnection {
                    pool: self,
                    conn: Some(conn),
                };
            }
            self.available.wait(&mut idle);
        }
    }

    /// Acquires a connection, runs one command, and releases the connection.
    pub fn execute(&self, cmd: &str, args: &[Arg]) -> ClientResult<Reply> {
        self.acquire().execute(cmd, args)
    }

    /// [`ConnectionPool::execute`] for dynamically typed arguments.
    pub fn execute_dynamic(
        &self,
        cmd: &str,
        values: Vec<serde_json::Value>,
    ) -> ClientResult<Reply> {
        self.acquire().execute_dynamic(cmd, values)
    }

    /// Takes back every connection in turn and closes it.
    ///
    /// Guards borrow the pool, so none can be outstanding here unless one was
    /// leaked with `mem::forget`, in which case this blocks forever.
    pub fn close(self) {
        for _ in 0..self.max_connections {
            let mut guard = self.acquire();
            if let Some(mut conn) = guard.conn.take() {
                conn.close();
            }
        }
        debug!(endpoint = ?self.options.endpoint, "connection pool closed");
    }

    fn release(&self, conn: Connection) {
        self.idle.lock().push_back(conn);
        self.available.notify_one();
    }
}

/// RAII wrapper returning a connection to the pool on drop.
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    conn: Option<Connection>,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
