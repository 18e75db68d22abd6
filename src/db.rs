use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr, RuntimeErr,
    SqlxPostgresConnector, Statement, TransactionTrait,
};
use sqlx::postgres::PgPoolOptions;
use tokio::fs;

pub type DbPool = sqlx::PgPool;
pub type OrmConn = DatabaseConnection;

const LOCK_NOT_AVAILABLE: &str = "55P03";

/// Create the shared Postgres pool.
pub async fn create_pool(database_url: &str) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Wrap an existing pool in a SeaORM connection so both layers share connections.
pub fn orm_from_pool(pool: &DbPool) -> OrmConn {
    SqlxPostgresConnector::from_sqlx_postgres_pool(pool.clone())
}

/// Create a SeaORM connection backed by a fresh pool.
pub async fn create_orm_conn(database_url: &str) -> Result<OrmConn> {
    let pool = create_pool(database_url).await?;
    Ok(orm_from_pool(&pool))
}

/// Minimal migration runner that executes SQL files in `migrations/` in filename order.
pub async fn run_migrations(conn: &DatabaseConnection) -> Result<()> {
    let mut entries = fs::read_dir("migrations").await?;
    let mut files: Vec<PathBuf> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "sql") {
            files.push(path);
        }
    }
    files.sort();

    let backend = conn.get_database_backend();
    for file in files {
        tracing::debug!(file = %file.display(), "applying migration");
        let sql = fs::read_to_string(&file).await?;
        // Postgres prepared statements cannot contain multiple commands,
        // so split the migration file and run each statement individually.
        for stmt in sql.split(';') {
            let stmt = stmt.trim();
            if stmt.is_empty() {
                continue;
            }
            let statement = format!("{stmt};");
            conn.execute(Statement::from_string(backend, statement))
                .await?;
        }
    }

    Ok(())
}

/// Begin a transaction whose row-lock waits give up after `lock_timeout`.
pub async fn begin_locking(
    conn: &DatabaseConnection,
    lock_timeout: Duration,
) -> Result<DatabaseTransaction, DbErr> {
    let txn = conn.begin().await?;
    txn.execute_unprepared(&format!(
        "SET LOCAL lock_timeout = '{}ms'",
        lock_timeout.as_millis()
    ))
    .await?;
    Ok(txn)
}

/// Postgres gave up waiting for a row lock (`lock_timeout` elapsed).
pub fn is_lock_timeout(err: &DbErr) -> bool {
    let runtime = match err {
        DbErr::Query(e) | DbErr::Exec(e) => e,
        _ => return false,
    };
    matches!(
        runtime,
        RuntimeErr::SqlxError(sqlx::Error::Database(db))
            if db.code().as_deref() == Some(LOCK_NOT_AVAILABLE)
    )
}

/// True when `err` is a unique violation on the named constraint or index.
pub fn violates_unique(err: &DbErr, constraint: &str) -> bool {
    match err.sql_err() {
        Some(sea_orm::SqlErr::UniqueConstraintViolation(message)) => message.contains(constraint),
        _ => false,
    }
}
