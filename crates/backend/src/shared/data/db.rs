use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Statement,
};
use std::path::Path;
use std::time::Duration;

/// Schema of every table the ingestion core owns.
///
/// Uniqueness constraints here carry the idempotency guarantees: the ledger
/// natural key, one connection per (tenant, platform), one webhook row per
/// (platform, delivery id).
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS a001_platform_connection (
        id TEXT PRIMARY KEY NOT NULL,
        tenant_id TEXT NOT NULL,
        platform TEXT NOT NULL,
        status TEXT NOT NULL,
        credential TEXT NOT NULL,
        last_error TEXT,
        synced_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS ux_a001_platform_connection_tenant_platform
        ON a001_platform_connection (tenant_id, platform);
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS a002_webhook_event (
        id TEXT PRIMARY KEY NOT NULL,
        platform TEXT NOT NULL,
        delivery_id TEXT NOT NULL,
        tenant_id TEXT,
        event_type TEXT NOT NULL,
        status TEXT NOT NULL,
        note TEXT,
        raw_payload TEXT NOT NULL,
        received_at TEXT NOT NULL,
        processed_at TEXT
    );
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS ux_a002_webhook_event_delivery
        ON a002_webhook_event (platform, delivery_id);
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS a003_tenant_profile (
        tenant_id TEXT PRIMARY KEY NOT NULL,
        email TEXT NOT NULL,
        display_name TEXT,
        created_at TEXT NOT NULL
    );
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS ux_a003_tenant_profile_email
        ON a003_tenant_profile (email);
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS p900_sales_ledger (
        id TEXT PRIMARY KEY NOT NULL,
        tenant_id TEXT NOT NULL,
        platform TEXT NOT NULL,
        natural_key TEXT NOT NULL,
        platform_txn_id TEXT,
        event_type TEXT NOT NULL,
        title TEXT NOT NULL,
        quantity INTEGER NOT NULL,
        amount TEXT NOT NULL,
        currency TEXT NOT NULL,
        occurred_at TEXT NOT NULL,
        occurred_on TEXT NOT NULL,
        raw TEXT NOT NULL,
        source TEXT NOT NULL,
        ingested_at TEXT NOT NULL
    );
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS ux_p900_sales_ledger_natural_key
        ON p900_sales_ledger (tenant_id, platform, natural_key);
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS ix_p900_sales_ledger_tenant_day
        ON p900_sales_ledger (tenant_id, occurred_on);
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS p901_daily_sales (
        tenant_id TEXT NOT NULL,
        day TEXT NOT NULL,
        platform TEXT NOT NULL,
        title TEXT NOT NULL,
        currency TEXT NOT NULL,
        units_sold INTEGER NOT NULL,
        units_refunded INTEGER NOT NULL,
        net_units INTEGER NOT NULL,
        gross_amount TEXT NOT NULL,
        refunded_amount TEXT NOT NULL,
        net_amount TEXT NOT NULL,
        event_count INTEGER NOT NULL,
        computed_at TEXT NOT NULL,
        PRIMARY KEY (tenant_id, day, platform, title, currency)
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS p901_rollup_watermark (
        name TEXT PRIMARY KEY NOT NULL,
        started_at TEXT NOT NULL
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS ix_p900_sales_ledger_ingested
        ON p900_sales_ledger (ingested_at);
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sys_ingestion_jobs (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        tenant_id TEXT NOT NULL,
        platform TEXT NOT NULL,
        status TEXT NOT NULL,
        payload TEXT NOT NULL,
        attempt INTEGER NOT NULL DEFAULT 1,
        parent_job_id TEXT,
        records_written INTEGER NOT NULL DEFAULT 0,
        last_error TEXT,
        available_at INTEGER NOT NULL,
        delayed INTEGER NOT NULL DEFAULT 0,
        lease_expires_at INTEGER,
        created_at TEXT NOT NULL,
        last_attempted_at TEXT,
        finished_at TEXT
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS ix_sys_ingestion_jobs_ready
        ON sys_ingestion_jobs (status, delayed, seq);
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS ix_sys_ingestion_jobs_pair
        ON sys_ingestion_jobs (tenant_id, platform, status);
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sys_upload_blobs (
        id TEXT PRIMARY KEY NOT NULL,
        tenant_id TEXT NOT NULL,
        platform TEXT NOT NULL,
        kind TEXT NOT NULL,
        file_name TEXT,
        bytes BLOB NOT NULL,
        size INTEGER NOT NULL,
        created_at TEXT NOT NULL
    );
    "#,
];

fn build_sqlite_url(path: &Path) -> String {
    // Normalize path separators and ensure proper URL form on Windows
    let normalized = path.to_string_lossy().replace('\\', "/");
    let needs_leading_slash = !normalized.starts_with('/') && normalized.contains(':');
    let prefix = if needs_leading_slash { "/" } else { "" };
    format!("sqlite://{}{}?mode=rwc", prefix, normalized)
}

/// Открывает (или создаёт) файл БД и применяет схему
pub async fn initialize_database(db_file: &Path) -> anyhow::Result<DatabaseConnection> {
    if let Some(parent) = db_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let absolute_path = if db_file.is_absolute() {
        db_file.to_path_buf()
    } else {
        std::env::current_dir()?.join(db_file)
    };

    let mut options = ConnectOptions::new(build_sqlite_url(&absolute_path));
    options
        .max_connections(8)
        .acquire_timeout(Duration::from_secs(30))
        .sqlx_logging(false);
    let conn = Database::connect(options).await?;

    conn.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        "PRAGMA journal_mode=WAL;".to_string(),
    ))
    .await?;

    bootstrap_schema(&conn).await?;
    tracing::info!("Database ready at {}", absolute_path.display());
    Ok(conn)
}

/// Columns added after a table first shipped: (table, column, definition)
const ADDED_COLUMNS: &[(&str, &str, &str)] = &[("a001_platform_connection", "synced_at", "TEXT")];

/// Ensure required tables exist (idempotent)
pub async fn bootstrap_schema<C: ConnectionTrait>(conn: &C) -> anyhow::Result<()> {
    for sql in SCHEMA {
        conn.execute(Statement::from_string(DatabaseBackend::Sqlite, sql.to_string()))
            .await?;
    }
    for (table, column, definition) in ADDED_COLUMNS {
        ensure_column(conn, table, column, definition).await?;
    }
    Ok(())
}

/// Older database files keep their original CREATE TABLE; add missing columns
async fn ensure_column<C: ConnectionTrait>(
    conn: &C,
    table: &str,
    column: &str,
    definition: &str,
) -> anyhow::Result<()> {
    let pragma = format!("PRAGMA table_info('{}');", table);
    let cols = conn
        .query_all(Statement::from_string(DatabaseBackend::Sqlite, pragma))
        .await?;
    let exists = cols
        .iter()
        .any(|row| row.try_get::<String>("", "name").is_ok_and(|name| name == column));
    if !exists {
        tracing::info!("Adding column {}.{}", table, column);
        conn.execute(Statement::from_string(
            DatabaseBackend::Sqlite,
            format!("ALTER TABLE {} ADD COLUMN {} {};", table, column, definition),
        ))
        .await?;
    }
    Ok(())
}

/// In-memory database with the production schema, for tests.
///
/// A single pooled connection keeps the shared in-memory database alive
/// and serializes access to it.
#[cfg(test)]
pub async fn connect_in_memory() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:".to_string());
    options
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(Duration::from_secs(3600))
        .max_lifetime(Duration::from_secs(3600))
        .sqlx_logging(false);
    let conn = Database::connect(options)
        .await
        .expect("in-memory sqlite should open");
    bootstrap_schema(&conn)
        .await
        .expect("schema bootstrap should succeed");
    conn
}
