use diesel::Connection;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use thiserror::Error;
use tracing::info;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

#[derive(Error, Debug)]
pub enum DbError {
    #[error("failed to connect to {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: diesel::ConnectionError,
    },
    #[error("failed to run migrations: {0}")]
    Migration(String),
}

pub fn establish_connection(database_url: &str) -> Result<SqliteConnection, DbError> {
    let mut connection =
        SqliteConnection::establish(database_url).map_err(|source| DbError::Connection {
            url: database_url.to_string(),
            source,
        })?;

    run_migrations(&mut connection)?;
    Ok(connection)
}

pub fn run_migrations(connection: &mut SqliteConnection) -> Result<(), DbError> {
    let applied = connection
        .run_pending_migrations(MIGRATIONS)
        .map_err(|err| DbError::Migration(err.to_string()))?;
    if !applied.is_empty() {
        info!(count = applied.len(), "Applied pending migrations");
    }
    Ok(())
}
