//! Transaction handling with savepoints example.
//!
//! # Running
//!
//! ```bash
//! FB_DATABASE=/data/scratch.fdb cargo run --example transactions
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use firebird_client::{Command, Config, Error, IsolationLevel, Session};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let host = std::env::var("FB_HOST").unwrap_or_else(|_| "localhost".into());
    let database = std::env::var("FB_DATABASE").unwrap_or_else(|_| "scratch".into());
    let conn_str = format!(
        "DataSource={host};Database={database};User=SYSDBA;Password=masterkey;Charset=UTF8"
    );
    let mut session = Session::connect(Config::from_connection_string(&conn_str)?).await?;

    // DDL runs in its own implicit transaction.
    Command::new("RECREATE TABLE DEMO_USERS (ID INTEGER, NAME VARCHAR(100))")
        .execute_non_query(&mut session)
        .await?;

    let tx = session
        .begin_transaction_with(IsolationLevel::RepeatableRead)
        .await?;
    let mut insert = Command::new("INSERT INTO DEMO_USERS (ID, NAME) VALUES (@id, @name)")
        .with_transaction(&tx)
        .bind("@id", 1)
        .bind("@name", "Alice");
    insert.execute_non_query(&mut session).await?;
    println!("Inserted Alice");

    let savepoint = tx.save(&mut session, "before_bob").await?;
    insert.parameters_mut()[0].set_value(2);
    insert.parameters_mut()[1].set_value("Bob");
    insert.execute_non_query(&mut session).await?;
    println!("Inserted Bob");

    tx.rollback_to(&mut session, &savepoint).await?;
    println!("Rolled back to '{}'", savepoint.name());

    insert.dispose(&mut session).await?;
    tx.commit(&mut session).await?;

    let mut count = Command::new("SELECT COUNT(*) FROM DEMO_USERS");
    println!("rows after commit: {:?}", count.execute_scalar(&mut session).await?);

    Command::new("DROP TABLE DEMO_USERS")
        .execute_non_query(&mut session)
        .await?;
    session.close().await
}
