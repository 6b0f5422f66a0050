//! Connection pool example
//!
//! Leases connections from a pool, closes one of them early, and shuts the
//! pool down while a lease is still outstanding. Run with
//! `RUST_LOG=debug cargo run --example connection_pool` to watch each
//! connection open, return to the pool and close exactly once.

use relinquish::{AsyncRelease, Releasable};
use relinquish_examples::pool::{Endpoint, Pool, PoolError, PoolSize};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), PoolError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("relinquish connection pool example");
    println!("==================================\n");

    let endpoint = Endpoint::try_new("db.internal:5432")
        .map_err(|e| PoolError::InvalidConfig(e.to_string()))?;
    let size = PoolSize::try_new(3).map_err(|e| PoolError::InvalidConfig(e.to_string()))?;
    let pool = Pool::new(endpoint, size);

    // Three leases at once fill the pool.
    let a = pool.acquire()?;
    let b = pool.acquire()?;
    let c = pool.acquire()?;
    a.query("select * from accounts")?;
    b.query("select * from orders")?;
    match pool.acquire() {
        Err(PoolError::Exhausted(size)) => println!("pool full at {size} connections"),
        Err(other) => return Err(other),
        Ok(lease) => println!("unexpected extra lease #{}", lease.id()),
    }

    // Returning a lease makes its connection available again.
    let reused_id = a.id();
    drop(a);
    let again = pool.acquire()?;
    println!("reused connection #{} (was #{reused_id})", again.id());

    // A connection closed on its own leaves the pool.
    c.release_async().await?;
    println!(
        "closed #{} early; {} connections still open",
        c.id(),
        pool.open_connections()
    );
    drop(c);

    // Shutdown closes everything still open, including leased connections.
    pool.release_async().await?;
    println!("pool shut down: released = {}", pool.was_released());
    println!("query on outstanding lease: {:?}", b.query("select 1").map_err(|e| e.to_string()));
    assert!(!pool.release_async().await?);

    Ok(())
}
