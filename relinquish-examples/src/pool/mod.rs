//! A small connection pool.
//!
//! Every connection the pool opens joins an [`AsyncReleaseCollection`], so
//! shutting the pool down closes each connection exactly once. A connection
//! closed on its own (say, after a protocol error) drops out of the
//! collection and is never handed out again.

mod connection;
mod types;

pub use connection::Connection;
pub use types::{Endpoint, PoolError, PoolSize};

use std::ops::Deref;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use relinquish::{AsyncRelease, AsyncReleaseCollection, Releasable, ReleaseResult, ReleaseState};
use tracing::{debug, warn};

struct Shared {
    endpoint: Endpoint,
    size: usize,
    connections: AsyncReleaseCollection,
    idle: Mutex<Vec<Arc<Connection>>>,
    next_id: Mutex<u64>,
}

/// A fixed-size pool of [`Connection`]s.
#[derive(Clone)]
pub struct Pool {
    shared: Arc<Shared>,
}

impl Pool {
    /// Creates an empty pool. Connections are opened on demand.
    pub fn new(endpoint: Endpoint, size: PoolSize) -> Self {
        Self {
            shared: Arc::new(Shared {
                endpoint,
                size: size.into(),
                connections: AsyncReleaseCollection::new(),
                idle: Mutex::new(Vec::new()),
                next_id: Mutex::new(0),
            }),
        }
    }

    /// Leases a connection, reusing an idle one when possible.
    pub fn acquire(&self) -> Result<Lease, PoolError> {
        let shared = &self.shared;
        if !shared.connections.is_alive() {
            return Err(PoolError::Closed(shared.endpoint.to_string()));
        }
        let reused = {
            let mut idle = shared.idle.lock();
            // Connections closed while idle are skipped.
            idle.retain(|connection| connection.is_alive());
            idle.pop()
        };
        let connection = match reused {
            Some(connection) => connection,
            None => self.open()?,
        };
        Ok(Lease {
            connection: Some(connection),
            pool: Arc::downgrade(&self.shared),
        })
    }

    /// Open connections, leased or idle.
    pub fn open_connections(&self) -> usize {
        self.shared.connections.len()
    }

    /// Idle connections ready to be leased.
    pub fn idle_connections(&self) -> usize {
        self.shared.idle.lock().len()
    }

    fn open(&self) -> Result<Arc<Connection>, PoolError> {
        let shared = &self.shared;
        let mut next_id = shared.next_id.lock();
        if shared.connections.len() >= shared.size {
            return Err(PoolError::Exhausted(shared.size));
        }
        *next_id += 1;
        let connection = Arc::new(Connection::open(*next_id, shared.endpoint.clone())?);
        shared.connections.add_async(connection.clone())?;
        Ok(connection)
    }
}

impl Releasable for Pool {
    fn release_state(&self) -> Option<&ReleaseState> {
        self.shared.connections.release_state()
    }
}

#[async_trait]
impl AsyncRelease for Pool {
    /// Closes every open connection, leased ones included.
    async fn release_async(&self) -> ReleaseResult<bool> {
        let closed = self.shared.connections.release_async().await;
        self.shared.idle.lock().clear();
        closed
    }
}

/// A leased connection. Dropping it returns the connection to the pool.
pub struct Lease {
    connection: Option<Arc<Connection>>,
    pool: Weak<Shared>,
}

impl Deref for Lease {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // Only Drop empties the slot.
        self.connection
            .as_deref()
            .expect("lease holds its connection until dropped")
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        let Some(pool) = self.pool.upgrade() else {
            return;
        };
        if connection.is_alive() && pool.connections.is_alive() {
            debug!(id = connection.id(), "connection returned to pool");
            pool.idle.lock().push(connection);
        } else {
            warn!(id = connection.id(), "closed connection not returned to pool");
        }
    }
}
