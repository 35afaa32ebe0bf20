use anyhow::Result;
use arrow_array::{Array, Float32Array, Float64Array, Int32Array, Int64Array, RecordBatch, StringArray};
use futures::{Stream, TryStreamExt};
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use serde_json::{Map, Value};

use winesearch_core::query::RawHit;

pub const NUM_PROBES: usize = 20;

const TEXT_COLUMNS: [&str; 7] = ["title", "description", "variety", "country", "province", "winery", "taster_name"];

/// Nearest rows by cosine distance, ties broken by ascending id. Lance
/// returns equal distances in storage order, so the fetch window grows until
/// every row tied with the last wanted one is in hand.
pub async fn nearest(
    table: &Table,
    vector: Vec<f32>,
    filter: Option<String>,
    limit: usize,
    offset: usize,
) -> Result<Vec<RawHit>> {
    let wanted = offset + limit;
    if limit == 0 {
        return Ok(Vec::new());
    }
    let mut fetch = wanted * 2;
    loop {
        let mut query = table
            .vector_search(vector.clone())?
            .distance_type(DistanceType::Cosine)
            .nprobes(NUM_PROBES)
            .limit(fetch);
        if let Some(filter) = filter.clone() {
            query = query.only_if(filter);
        }
        let mut hits = collect(query.execute().await?).await?;
        hits.sort_by(|a, b| score_of(b).total_cmp(&score_of(a)).then_with(|| id_of(a).cmp(&id_of(b))));
        let settled = hits.len() < fetch
            || hits.len() <= wanted
            || score_of(&hits[hits.len() - 1]) < score_of(&hits[wanted - 1]);
        if settled {
            return Ok(page(hits, limit, offset));
        }
        fetch *= 2;
    }
}

/// Filtered rows in ascending id order.
pub async fn scan(table: &Table, filter: Option<String>, limit: usize, offset: usize) -> Result<Vec<RawHit>> {
    let total = table.count_rows(filter.clone()).await?;
    if total <= offset {
        return Ok(Vec::new());
    }
    let mut query = table.query().limit(total);
    if let Some(filter) = filter {
        query = query.only_if(filter);
    }
    let mut hits = collect(query.execute().await?).await?;
    hits.sort_by_key(id_of);
    Ok(page(hits, limit, offset))
}

async fn collect<S, E>(mut stream: S) -> Result<Vec<RawHit>>
where
    S: Stream<Item = std::result::Result<RecordBatch, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut hits = Vec::new();
    while let Some(batch) = stream.try_next().await? {
        hits.extend(rows(&batch));
    }
    Ok(hits)
}

fn score_of(hit: &RawHit) -> f32 {
    hit.score.unwrap_or(f32::MIN)
}

fn id_of(hit: &RawHit) -> i64 {
    hit.fields.get("id").and_then(Value::as_i64).unwrap_or(i64::MAX)
}

fn page(hits: Vec<RawHit>, limit: usize, offset: usize) -> Vec<RawHit> {
    hits.into_iter().skip(offset).take(limit).collect()
}

fn rows(batch: &RecordBatch) -> Vec<RawHit> {
    (0..batch.num_rows()).map(|i| row(batch, i)).collect()
}

fn row(batch: &RecordBatch, i: usize) -> RawHit {
    let mut fields = Map::new();
    if let Some(id) = column::<Int64Array>(batch, "id").filter(|c| c.is_valid(i)) {
        fields.insert("id".into(), Value::from(id.value(i)));
    }
    for name in TEXT_COLUMNS {
        if let Some(col) = column::<StringArray>(batch, name).filter(|c| c.is_valid(i)) {
            fields.insert(name.into(), Value::from(col.value(i)));
        }
    }
    if let Some(points) = column::<Int32Array>(batch, "points").filter(|c| c.is_valid(i)) {
        fields.insert("points".into(), Value::from(points.value(i)));
    }
    let price = column::<Float64Array>(batch, "price")
        .filter(|c| c.is_valid(i))
        .map_or(Value::Null, |c| Value::from(c.value(i)));
    fields.insert("price".into(), price);

    let score = column::<Float32Array>(batch, "_distance")
        .filter(|c| c.is_valid(i))
        .map(|c| 1.0 - c.value(i));
    RawHit { fields, score }
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Option<&'a T> {
    batch.column_by_name(name)?.as_any().downcast_ref::<T>()
}
