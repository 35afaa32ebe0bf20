//! IVF_PQ index over the `vector` column, built once ingestion is done.
use anyhow::Result;
use lancedb::index::{vector::IvfPqIndexBuilder, Index};
use lancedb::{DistanceType, Table};
use tracing::info;

/// Below this many rows a flat scan is as fast as an index and PQ training
/// has too little data.
pub const MIN_ROWS_FOR_INDEX: usize = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvfPqParams {
    pub num_partitions: u32,
    pub num_sub_vectors: u32,
}

/// Partitions: the power of two closest to `rows / 5000`. Sub-vectors: `dim / 4`.
pub fn compute_ivfpq_params(rows: usize, dim: usize) -> IvfPqParams {
    let target = (rows / 5_000).max(1);
    let upper = target.next_power_of_two();
    let lower = (upper / 2).max(1);
    let num_partitions = if upper - target <= target - lower { upper } else { lower };
    let num_sub_vectors = (dim / 4).max(1);
    IvfPqParams { num_partitions: num_partitions as u32, num_sub_vectors: num_sub_vectors as u32 }
}

pub async fn build_ivfpq_index(table: &Table, index_name: &str, params: &IvfPqParams) -> Result<()> {
    info!(index = index_name, partitions = params.num_partitions, sub_vectors = params.num_sub_vectors, "building IVF_PQ index");
    table
        .create_index(
            &["vector"],
            Index::IvfPq(
                IvfPqIndexBuilder::default()
                    .distance_type(DistanceType::Cosine)
                    .num_partitions(params.num_partitions)
                    .num_sub_vectors(params.num_sub_vectors),
            ),
        )
        .name(index_name.to_string())
        .replace(true)
        .execute()
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_follow_dataset_size() {
        assert_eq!(compute_ivfpq_params(130_000, 384), IvfPqParams { num_partitions: 32, num_sub_vectors: 96 });
        assert_eq!(compute_ivfpq_params(100, 384).num_partitions, 1);
        assert_eq!(compute_ivfpq_params(60_000, 768), IvfPqParams { num_partitions: 16, num_sub_vectors: 192 });
    }
}
