use anyhow::{anyhow, Result};
use arrow_array::{FixedSizeListArray, Float64Array, Int32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use lancedb::Table;
use std::sync::Arc;

use winesearch_core::types::WineRecord;

use crate::schema::build_arrow_schema;

/// Rows inserted and rows replaced by one upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertCounts {
    pub inserted: usize,
    pub updated: usize,
}

pub fn records_to_batch(records: &[WineRecord], vectors: &[Vec<f32>], dim: i32) -> Result<RecordBatch> {
    if records.len() != vectors.len() {
        return Err(anyhow!("{} records but {} vectors", records.len(), vectors.len()));
    }
    let vector_rows: Vec<Option<Vec<Option<f32>>>> =
        vectors.iter().map(|v| Some(v.iter().map(|&x| Some(x)).collect())).collect();
    let batch = RecordBatch::try_new(
        build_arrow_schema(dim),
        vec![
            Arc::new(Int64Array::from_iter_values(records.iter().map(|r| r.id))),
            Arc::new(text_column(records, |r| Some(r.title.as_str()))),
            Arc::new(text_column(records, |r| r.description.as_deref())),
            Arc::new(text_column(records, |r| Some(r.variety.as_str()))),
            Arc::new(text_column(records, |r| Some(r.country.as_str()))),
            Arc::new(text_column(records, |r| r.province.as_deref())),
            Arc::new(text_column(records, |r| Some(r.winery.as_str()))),
            Arc::new(Int32Array::from_iter_values(records.iter().map(|r| i32::from(r.points)))),
            Arc::new(records.iter().map(|r| r.price).collect::<Float64Array>()),
            Arc::new(text_column(records, |r| r.taster_name.as_deref())),
            Arc::new(text_column(records, |r| r.taster_twitter_handle.as_deref())),
            Arc::new(text_column(records, |r| r.vineyard.as_deref())),
            Arc::new(text_column(records, |r| r.region_1.as_deref())),
            Arc::new(text_column(records, |r| r.region_2.as_deref())),
            Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(
                vector_rows.into_iter(),
                dim,
            )),
        ],
    )?;
    Ok(batch)
}

fn text_column<'a>(records: &'a [WineRecord], f: impl Fn(&'a WineRecord) -> Option<&'a str>) -> StringArray {
    records.iter().map(f).collect()
}

/// Insert-or-replace keyed on `id`.
pub async fn upsert(table: &Table, batch: RecordBatch) -> Result<UpsertCounts> {
    let schema = batch.schema();
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
    let mut mi = table.merge_insert(&["id"]);
    mi.when_matched_update_all(None).when_not_matched_insert_all();
    let res = mi.execute(reader).await?;
    Ok(UpsertCounts { inserted: res.num_inserted_rows as usize, updated: res.num_updated_rows as usize })
}
