//! LanceDB connection and table helpers, including the key/value meta table
//! that records what a persisted index was built with.

use anyhow::{anyhow, Result};
use arrow_array::{RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use arrow_schema::Schema;
use chrono::Utc;
use lancedb::query::ExecutableQuery;
use lancedb::{connect, Connection};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::schema::meta_schema;

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    Ok(conn.table_names().execute().await?.iter().any(|t| t == name))
}

/// Creates `name` from `batch`, or an empty table with `schema` when `batch` is `None`.
pub async fn create_table(conn: &Connection, name: &str, schema: Arc<Schema>, batch: Option<RecordBatch>) -> Result<()> {
    let batches: Vec<std::result::Result<RecordBatch, arrow_schema::ArrowError>> = batch.into_iter().map(Ok).collect();
    let reader = Box::new(RecordBatchIterator::new(batches.into_iter(), schema));
    conn.create_table(name, reader).execute().await?;
    Ok(())
}

pub async fn write_meta(conn: &Connection, table: &str, entries: &BTreeMap<String, String>) -> Result<()> {
    let now = Utc::now().timestamp_millis();
    let rb = RecordBatch::try_new(
        meta_schema(),
        vec![
            Arc::new(StringArray::from(entries.keys().cloned().collect::<Vec<_>>())),
            Arc::new(StringArray::from(entries.values().cloned().collect::<Vec<_>>())),
            Arc::new(TimestampMillisecondArray::from(vec![now; entries.len()])),
        ],
    )?;
    create_table(conn, table, meta_schema(), Some(rb)).await
}

pub async fn read_meta(conn: &Connection, table: &str) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    if !table_exists(conn, table).await? {
        return Ok(out);
    }
    let t = conn.open_table(table).execute().await?;
    let mut stream = t.query().execute().await?;
    while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await? {
        let keys = batch
            .column_by_name("key")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| anyhow!("meta.key column missing"))?;
        let values = batch
            .column_by_name("value")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| anyhow!("meta.value column missing"))?;
        for i in 0..batch.num_rows() {
            out.insert(keys.value(i).to_string(), values.value(i).to_string());
        }
    }
    Ok(out)
}
