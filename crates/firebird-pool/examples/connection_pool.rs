//! Connection pooling example.
//!
//! Runs a few concurrent workers against one pooled connection string and
//! prints the pool status as connections are reused and expire.
//!
//! # Running
//!
//! ```bash
//! FB_DATABASE=/data/employee.fdb cargo run --example connection_pool
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use firebird_client::Command;
use firebird_pool::{ConnectionPool, FirebirdManager, PoolConfig, PoolError};

#[tokio::main]
async fn main() -> Result<(), PoolError> {
    tracing_subscriber::fmt::init();

    let host = std::env::var("FB_HOST").unwrap_or_else(|_| "localhost".into());
    let database = std::env::var("FB_DATABASE").unwrap_or_else(|_| "employee".into());
    let user = std::env::var("FB_USER").unwrap_or_else(|_| "SYSDBA".into());
    let password = std::env::var("FB_PASSWORD").unwrap_or_else(|_| "masterkey".into());

    let conn_str = format!(
        "DataSource={host};Database={database};User={user};Password={password};Connection Lifetime=2"
    );

    let pool = ConnectionPool::new(
        FirebirdManager,
        PoolConfig::new()
            .sweep_interval(Duration::from_secs(1))
            .max_idle(4),
    )?;

    let mut workers = Vec::new();
    for worker in 0..4 {
        let pool = pool.clone();
        let conn_str = conn_str.clone();
        workers.push(tokio::spawn(async move {
            for _ in 0..3 {
                let mut session = pool.get_connection(&conn_str).await?;
                let count = Command::new("SELECT COUNT(*) FROM RDB$RELATIONS")
                    .execute_scalar(&mut session)
                    .await?;
                println!("worker {worker} on connection {}: {count:?}", session.id());
                pool.free_connection(session).await?;
            }
            Ok::<_, PoolError>(())
        }));
    }
    for worker in workers {
        worker.await.expect("worker panicked")?;
    }
    println!("after workers: {:?}", pool.status());

    tokio::time::sleep(Duration::from_secs(4)).await;
    println!("after lifetime: {:?}", pool.status());

    pool.shutdown().await
}
