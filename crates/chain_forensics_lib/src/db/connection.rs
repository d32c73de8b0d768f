use crate::err_from;
use crate::error::ForensicError;
use sqlx::migrate::Migrator;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::ConnectOptions;
use sqlx::SqliteConnection;
use std::str::FromStr;

static MIGRATOR: Migrator = sqlx::migrate!();

/// Opens the forensic store. `None` gives a private in-memory database.
pub async fn create_sqlite_connection(
    file_name: Option<&str>,
    run_migrations: bool,
) -> Result<SqliteConnection, ForensicError> {
    let url = if let Some(file_name) = file_name {
        format!("sqlite://{}", file_name)
    } else {
        "sqlite::memory:".to_string()
    };
    log::debug!("connecting to db using url {}", url);

    let mut conn = SqliteConnectOptions::from_str(&url)
        .map_err(err_from!())?
        .create_if_missing(true)
        .connect()
        .await
        .map_err(err_from!())?;

    if run_migrations {
        MIGRATOR.run(&mut conn).await.map_err(err_from!())?;
    }

    Ok(conn)
}
