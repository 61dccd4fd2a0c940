//! LanceDB connection and housekeeping helpers.
//!
//! Provides database open functions and ensure-* helpers for tables.

use anyhow::Result;
use lancedb::{connect, Connection};
use arrow_array::RecordBatchIterator;
use std::path::Path;
use std::sync::Arc;

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<arrow_schema::Schema>) -> Result<()> {
    let names = conn.table_names().execute().await?;
    if names.contains(&name.to_string()) {
        return Ok(());
    }
    // create empty table with 0 rows
    let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
    conn.create_table(name, Box::new(iter)).execute().await?;
    Ok(())
}

/// Removes the on-disk files of `name` under a local database directory.
pub fn remove_local_table(db_path: &Path, name: &str) -> Result<()> {
    let dir = db_path.join(format!("{}.lance", name));
    if dir.exists() { std::fs::remove_dir_all(&dir)?; }
    Ok(())
}
