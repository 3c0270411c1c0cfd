use diesel::Connection;
use diesel_async::{
    async_connection_wrapper::AsyncConnectionWrapper,
    pooled_connection::{
        deadpool::{BuildError, Object, Pool, PoolError},
        AsyncDieselConnectionManager,
    },
    AsyncPgConnection,
};
use thiserror::Error;
use tracing::info;

pub type DbPool = Pool<AsyncPgConnection>;
pub type DbConnection = Object<AsyncPgConnection>;

/// Blocking connection used only to run embedded migrations.
pub type MigrationConnection = AsyncConnectionWrapper<AsyncPgConnection>;

pub fn establish_pool(database_url: &str, max_size: usize) -> Result<DbPool, BuildError> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    let pool = Pool::builder(manager).max_size(max_size).build()?;
    info!(max_size, "database pool ready");
    Ok(pool)
}

pub fn establish_migration_connection(
    database_url: &str,
) -> Result<MigrationConnection, diesel::ConnectionError> {
    MigrationConnection::establish(database_url)
}

pub async fn connection(pool: &DbPool) -> Result<DbConnection, StoreError> {
    Ok(pool.get().await?)
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}
