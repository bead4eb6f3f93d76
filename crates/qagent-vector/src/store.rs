use anyhow::{anyhow, ensure, Result};
use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, StringArray};
use std::sync::Arc;

use qagent_core::types::Chunk;

use crate::schema::chunk_schema;

/// One stored chunk with its embedding and insertion position.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorEntry {
    pub ordinal: u64,
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

pub fn entries_to_batch(entries: &[VectorEntry], dim: usize) -> Result<RecordBatch> {
    let width = i32::try_from(dim)?;
    let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(entries.len());
    for e in entries {
        ensure!(e.vector.len() == dim, "entry {} has dimension {}, expected {dim}", e.chunk.id, e.vector.len());
        vectors.push(Some(e.vector.iter().map(|&x| Some(x)).collect()));
    }
    let batch = RecordBatch::try_new(
        chunk_schema(width),
        vec![
            Arc::new(StringArray::from(entries.iter().map(|e| e.chunk.id.clone()).collect::<Vec<_>>())),
            Arc::new(StringArray::from(entries.iter().map(|e| e.chunk.doc_id.clone()).collect::<Vec<_>>())),
            Arc::new(int_column(entries, |e| e.chunk.seq as u64)?),
            Arc::new(int_column(entries, |e| e.ordinal)?),
            Arc::new(int_column(entries, |e| e.chunk.char_start as u64)?),
            Arc::new(int_column(entries, |e| e.chunk.char_end as u64)?),
            Arc::new(StringArray::from(entries.iter().map(|e| e.chunk.text.clone()).collect::<Vec<_>>())),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors.into_iter(), width)),
        ],
    )?;
    Ok(batch)
}

fn int_column(entries: &[VectorEntry], f: impl Fn(&VectorEntry) -> u64) -> Result<Int64Array> {
    let values = entries.iter().map(|e| i64::try_from(f(e))).collect::<std::result::Result<Vec<i64>, _>>()?;
    Ok(Int64Array::from(values))
}

fn strings<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow!("column {name} missing or not utf8"))
}

fn ints<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| anyhow!("column {name} missing or not int64"))
}

pub fn batch_to_entries(batch: &RecordBatch) -> Result<Vec<VectorEntry>> {
    let ids = strings(batch, "id")?;
    let doc_ids = strings(batch, "doc_id")?;
    let texts = strings(batch, "text")?;
    let seqs = ints(batch, "seq")?;
    let ordinals = ints(batch, "ordinal")?;
    let starts = ints(batch, "char_start")?;
    let ends = ints(batch, "char_end")?;
    let vectors = batch
        .column_by_name("vector")
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
        .ok_or_else(|| anyhow!("column vector missing or not a fixed-size list"))?;

    let mut out = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let values = vectors.value(i);
        let floats = values
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| anyhow!("vector items are not float32"))?;
        out.push(VectorEntry {
            ordinal: u64::try_from(ordinals.value(i))?,
            chunk: Chunk {
                id: ids.value(i).to_string(),
                doc_id: doc_ids.value(i).to_string(),
                seq: usize::try_from(seqs.value(i))?,
                text: texts.value(i).to_string(),
                char_start: usize::try_from(starts.value(i))?,
                char_end: usize::try_from(ends.value(i))?,
            },
            vector: floats.values().to_vec(),
        });
    }
    Ok(out)
}
