//! A simulated network connection.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use relinquish::{AsyncRelease, Releasable, ReleaseResult, ReleaseState, ResourceName};
use tracing::info;

use super::types::Endpoint;

/// One open connection.
///
/// Closing is asynchronous: the connection says goodbye to the server before
/// its socket goes away.
pub struct Connection {
    id: u64,
    endpoint: Endpoint,
    state: ReleaseState,
    queries: AtomicU64,
}

impl Connection {
    pub(crate) fn open(id: u64, endpoint: Endpoint) -> ReleaseResult<Self> {
        let name = ResourceName::parse(format!("connection #{id} to {endpoint}"))?;
        info!(id, %endpoint, "connection opened");
        Ok(Self {
            id,
            endpoint,
            state: ReleaseState::named(name),
            queries: AtomicU64::new(0),
        })
    }

    /// Pool-local id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Runs a query. Fails once the connection is closed.
    pub fn query(&self, sql: &str) -> ReleaseResult<u64> {
        self.state.assert_alive()?;
        let count = self.queries.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(id = self.id, sql, "query executed");
        Ok(count)
    }

    /// How many queries ran on this connection.
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }
}

impl Releasable for Connection {
    fn release_state(&self) -> Option<&ReleaseState> {
        Some(&self.state)
    }
}

#[async_trait]
impl AsyncRelease for Connection {
    async fn release_async(&self) -> ReleaseResult<bool> {
        self.state
            .run_release_async(|| async {
                // Goodbye frame.
                tokio::time::sleep(Duration::from_millis(2)).await;
                info!(id = self.id, endpoint = %self.endpoint, queries = self.query_count(), "connection closed");
                Ok::<(), relinquish::ReleaseError>(())
            })
            .await
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("state", &self.state.state())
            .finish_non_exhaustive()
    }
}
