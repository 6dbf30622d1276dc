//! Pool construction, migrations, and the single-writer actor.

pub mod write_actor;

use std::path::Path;
use std::sync::Arc;

use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::errors::StorageError;

pub use write_actor::{spawn_writer, WriteHandle};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

const DB_FILENAME: &str = "pocketledger.db";

/// Resolve the database path inside the app data directory, creating the
/// directory when missing.
pub fn init(app_data_dir: &str) -> Result<String, StorageError> {
    std::fs::create_dir_all(app_data_dir)?;
    Ok(Path::new(app_data_dir)
        .join(DB_FILENAME)
        .to_string_lossy()
        .to_string())
}

pub fn run_migrations(db_path: &str) -> Result<(), StorageError> {
    let mut conn = SqliteConnection::establish(db_path)
        .map_err(|err| StorageError::Migration(err.to_string()))?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|err| StorageError::Migration(err.to_string()))?;
    Ok(())
}

pub fn create_pool(db_path: &str) -> Result<Arc<DbPool>, StorageError> {
    let manager = ConnectionManager::<SqliteConnection>::new(db_path);
    let pool = Pool::builder()
        .max_size(8)
        .connection_customizer(Box::new(ConnectionOptions))
        .build(manager)?;
    Ok(Arc::new(pool))
}

pub fn get_connection(pool: &Arc<DbPool>) -> Result<DbConnection, StorageError> {
    Ok(pool.get()?)
}

#[derive(Debug)]
struct ConnectionOptions;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}
