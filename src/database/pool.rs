use std::{str::FromStr, time::Duration};

use sqlx::{
    migrate::Migrator,
    pool::PoolConnection,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Pool, Sqlite, SqliteConnection,
};

use crate::error::{Error, ErrorKind, QueryError};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const MAX_CONNECTIONS: u32 = 8;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens the database, creating the file when missing, and applies pending migrations.
pub async fn connect(database_url: &str) -> Result<Pool<Sqlite>, Error> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(QueryError::from)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await
        .map_err(QueryError::from)?;

    migrate(&pool).await?;

    Ok(pool)
}

pub async fn migrate(pool: &Pool<Sqlite>) -> Result<(), Error> {
    MIGRATOR.run(pool).await.map_err(QueryError::from)?;
    log::info!("Database schema is up to date");

    Ok(())
}

/// A transaction that holds the write lock from its first statement.
///
/// Deferred transactions that read before writing fail with `SQLITE_BUSY` when another
/// writer gets in between, without waiting for the busy timeout. Dropping the transaction
/// before `commit` closes its connection, which rolls it back.
pub struct WriteTransaction {
    conn: Option<PoolConnection<Sqlite>>,
}

impl WriteTransaction {
    pub async fn begin(pool: &Pool<Sqlite>) -> Result<Self, Error> {
        let mut conn = pool.acquire().await.map_err(QueryError::from)?;
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(QueryError::from)?;

        Ok(Self { conn: Some(conn) })
    }

    pub fn conn(&mut self) -> Result<&mut SqliteConnection, Error> {
        self.conn.as_deref_mut().ok_or_else(|| {
            log::error!("Write transaction used after it was finished");
            ErrorKind::Internal.default()
        })
    }

    pub async fn commit(mut self) -> Result<(), Error> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        if let Err(e) = sqlx::query("COMMIT").execute(&mut *conn).await {
            drop(conn.detach());
            return Err(QueryError::from(e).into());
        }
        Ok(())
    }
}

impl Drop for WriteTransaction {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            log::debug!("Rolling back an unfinished write transaction");
            drop(conn.detach());
        }
    }
}
