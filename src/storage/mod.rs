use crate::config::{AppConfig, Policy};
use crate::models::{CategoryRecord, RankRecord, Record, Stored};
use anyhow::{anyhow, Context, Result};
use duckdb::{params_from_iter, Connection};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

// ── Schema ────────────────────────────────────────────────────────────────────

/// DDL for one record table. Upsert tables carry a UNIQUE constraint on the
/// natural key; append tables carry none.
pub fn table_ddl<R: Record>(policy: Policy) -> String {
    let seq = format!("{}_id_seq", R::TABLE);
    let columns: Vec<String> = R::COLUMNS
        .iter()
        .map(|col| {
            let unique = policy == Policy::Upsert && *col == R::key_column();
            format!(
                "    {:<10} VARCHAR NOT NULL DEFAULT ''{}",
                col,
                if unique { " UNIQUE" } else { "" }
            )
        })
        .collect();

    format!(
        "CREATE SEQUENCE IF NOT EXISTS {seq} START 1;\n\
         CREATE TABLE IF NOT EXISTS {table} (\n    \
         id         BIGINT PRIMARY KEY DEFAULT nextval('{seq}'),\n{columns}\n);\n",
        seq = seq,
        table = R::TABLE,
        columns = columns.join(",\n"),
    )
}

fn insert_sql<R: Record>(policy: Policy) -> String {
    let placeholders = vec!["?"; R::COLUMNS.len()].join(", ");
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        R::TABLE,
        R::COLUMNS.join(", "),
        placeholders
    );
    if policy == Policy::Upsert {
        let updates: Vec<String> = R::COLUMNS
            .iter()
            .filter(|c| **c != R::key_column())
            .map(|c| format!("{c} = excluded.{c}"))
            .collect();
        sql.push_str(&format!(
            " ON CONFLICT ({}) DO UPDATE SET {}",
            R::key_column(),
            updates.join(", ")
        ));
    }
    sql
}

/// Per-table policy, decided by configuration.
#[derive(Debug, Clone, Copy)]
pub struct Policies {
    pub rankings: Policy,
    pub categories: Policy,
}

impl From<&AppConfig> for Policies {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            rankings: cfg.sources.rankings.policy,
            categories: cfg.sources.categories.policy,
        }
    }
}

/// Idempotent create-if-absent for every table. Never drops or alters
/// existing tables, so a table created under another policy keeps its shape.
pub fn ensure_schema(conn: &Connection, policies: Policies) -> Result<()> {
    info!("Ensuring schema…");
    conn.execute_batch(&table_ddl::<RankRecord>(policies.rankings))
        .with_context(|| format!("DDL failed for {}", RankRecord::TABLE))?;
    conn.execute_batch(&table_ddl::<CategoryRecord>(policies.categories))
        .with_context(|| format!("DDL failed for {}", CategoryRecord::TABLE))?;
    info!("Schema ready.");
    Ok(())
}

// ── Reconciler ────────────────────────────────────────────────────────────────

/// A row failed mid-batch. Rows before it stay committed.
#[derive(Debug, Error)]
#[error("{table}: row {key:?} failed after {committed} rows committed: {source}")]
pub struct ReconcileError {
    pub table: &'static str,
    pub committed: usize,
    pub key: String,
    #[source]
    pub source: duckdb::Error,
}

fn insert_row<R: Record>(
    conn: &Connection,
    sql: &str,
    record: &R,
    committed: usize,
) -> std::result::Result<(), ReconcileError> {
    conn.execute(sql, params_from_iter(record.values()))
        .map(|_| ())
        .map_err(|source| ReconcileError {
            table: R::TABLE,
            committed,
            key: record.natural_key().to_string(),
            source,
        })
}

/// All rows in insertion-identity order.
pub fn fetch_all<R: Record>(conn: &Connection) -> Result<Vec<Stored<R>>> {
    let sql = format!(
        "SELECT id, {} FROM {} ORDER BY id ASC",
        R::COLUMNS.join(", "),
        R::TABLE
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            let id: i64 = row.get(0)?;
            let values = (1..=R::COLUMNS.len())
                .map(|i| row.get::<_, String>(i))
                .collect::<duckdb::Result<Vec<_>>>()?;
            Ok(Stored { id, record: R::from_values(values) })
        })?
        .collect::<duckdb::Result<Vec<_>>>()
        .with_context(|| format!("read {}", R::TABLE))?;
    Ok(rows)
}

pub fn count(conn: &Connection, table: &str) -> Result<i64> {
    let mut s = conn.prepare(&format!("SELECT COUNT(*) FROM {table}"))?;
    Ok(s.query_row([], |r| r.get(0))?)
}

/// `(rankings, categories)` row counts. A missing table is an error, never zero.
pub fn row_counts(conn: &Connection) -> Result<(i64, i64)> {
    let ranks = count(conn, RankRecord::TABLE)
        .with_context(|| format!("Counting {} (run `migrate` first?)", RankRecord::TABLE))?;
    let classes = count(conn, CategoryRecord::TABLE)
        .with_context(|| format!("Counting {} (run `migrate` first?)", CategoryRecord::TABLE))?;
    Ok((ranks, classes))
}

// ── Store ─────────────────────────────────────────────────────────────────────

/// Process-wide database handle. Each scrape or read checks out its own
/// connection; `close` tears the root down at shutdown.
///
/// Row writes through [`Store::reconcile`] are serialised store-wide.
pub struct Store {
    root: Mutex<Option<Connection>>,
    writes: Mutex<()>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Could not create dir {:?}", parent))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self::from_root(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_root(Connection::open_in_memory()?))
    }

    fn from_root(conn: Connection) -> Self {
        Self { root: Mutex::new(Some(conn)), writes: Mutex::new(()) }
    }

    /// A fresh connection to the same database, released when dropped.
    pub fn checkout(&self) -> Result<Connection> {
        let guard = self.root.lock().map_err(|_| anyhow!("store lock poisoned"))?;
        let root = guard.as_ref().ok_or_else(|| anyhow!("store is closed"))?;
        Ok(root.try_clone()?)
    }

    /// DDL runs on the root connection with the root lock held.
    pub fn ensure_schema(&self, policies: Policies) -> Result<()> {
        let guard = self.root.lock().map_err(|_| anyhow!("store lock poisoned"))?;
        let root = guard.as_ref().ok_or_else(|| anyhow!("store is closed"))?;
        let _w = self.writes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        ensure_schema(root, policies)
    }

    /// Merge `batch` into its table, one autocommitted statement per row, in
    /// batch order. No enclosing transaction: a failing row stops the batch
    /// and everything before it remains stored. Each row statement runs under
    /// the store's write lock.
    pub fn reconcile<R: Record>(
        &self,
        conn: &Connection,
        batch: &[R],
        policy: Policy,
    ) -> std::result::Result<usize, ReconcileError> {
        let sql = insert_sql::<R>(policy);
        for (i, record) in batch.iter().enumerate() {
            let _w = self.writes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            insert_row(conn, &sql, record, i)?;
        }
        debug!("{}: {} rows reconciled ({:?})", R::TABLE, batch.len(), policy);
        Ok(batch.len())
    }

    /// Close the root connection. Later checkouts fail.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.root.lock().map_err(|_| anyhow!("store lock poisoned"))?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| e).context("closing DuckDB")?;
            info!("Store closed.");
        }
        Ok(())
    }
}
