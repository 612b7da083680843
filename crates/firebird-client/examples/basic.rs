//! Basic query example.
//!
//! Connects, reads a few rows with a named parameter and prints server
//! information.
//!
//! # Running
//!
//! ```bash
//! FB_DATABASE=/data/employee.fdb cargo run --example basic
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use firebird_client::{Command, CommandBehavior, Config, Error, Session};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let host = std::env::var("FB_HOST").unwrap_or_else(|_| "localhost".into());
    let database = std::env::var("FB_DATABASE").unwrap_or_else(|_| "employee".into());
    let user = std::env::var("FB_USER").unwrap_or_else(|_| "SYSDBA".into());
    let password = std::env::var("FB_PASSWORD").unwrap_or_else(|_| "masterkey".into());

    let conn_str = format!(
        "DataSource={host};Database={database};User={user};Password={password};Charset=UTF8"
    );
    let mut session = Session::connect(Config::from_connection_string(&conn_str)?).await?;

    let info = session.database_info().await?;
    println!(
        "Connected to {} (ODS {}.{}, page size {})",
        info.firebird_version, info.ods_version, info.ods_minor_version, info.page_size
    );

    let mut query = Command::new(
        "SELECT RDB$RELATION_NAME FROM RDB$RELATIONS WHERE RDB$SYSTEM_FLAG = @system",
    )
    .bind("@system", 0);
    let mut reader = query
        .execute_reader(&mut session, CommandBehavior::default())
        .await?;
    while reader.read().await? {
        println!("table: {}", reader.get_string(0)?.trim_end());
    }
    reader.close().await?;

    let mut count = Command::new("SELECT COUNT(*) FROM RDB$RELATIONS");
    println!("relations: {:?}", count.execute_scalar(&mut session).await?);

    session.close().await
}
