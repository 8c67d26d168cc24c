use indexmap::IndexMap;
use loaddata_types::{LoadDataRow, RowLayout, SampleRow};
use tracing::debug;

use super::{GenerationContext, RowStrategy, emit_columns};
use crate::{scope::VariableScope, specification::SpecError};

/// `tiles_per_well` rows per well for stages that consume re-tiled images.
///
/// Tiles have no counterpart in the sample table: the channel and cycle lists come from the
/// column groups themselves, and each well's first sample row only serves `source` and
/// `expression` lookups.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticTileStrategy;

impl RowStrategy for SyntheticTileStrategy {
    fn layout(&self) -> RowLayout {
        RowLayout::SyntheticTiles
    }

    fn generate_rows(&self, context: &GenerationContext<'_>, samples: &[&SampleRow]) -> Result<Vec<LoadDataRow>, SpecError> {
        let columns = &context.pipeline.columns;
        let tile_count = context.pipeline.tile_count();

        let mut representatives: IndexMap<&str, &SampleRow> = IndexMap::new();
        for sample in samples {
            representatives.entry(sample.well.as_str()).or_insert(sample);
        }

        debug!(pipeline = %context.pipeline_id, wells = representatives.len(), tiles_per_well = tile_count, "expanding synthetic tiles");

        let mut rows = Vec::with_capacity(representatives.len() * tile_count as usize);
        for (well, representative) in representatives {
            for tile in 1..=tile_count {
                let mut tile_scope = VariableScope::new();
                tile_scope.insert("base_path", context.base_path);
                tile_scope.insert("batch", representative.batch.as_str());
                tile_scope.insert("plate", representative.plate.as_str());
                tile_scope.insert("well", well);
                tile_scope.insert("tile", tile);
                tile_scope.insert("site", tile);

                let mut row = LoadDataRow::new();
                emit_columns(&mut row, &columns.metadata, representative, &tile_scope);

                if let Some(group) = &columns.barcoding_channels {
                    for &cycle in &group.cycles {
                        let cycle_scope = tile_scope.with("cycle", cycle);
                        for channel in &group.channels {
                            emit_columns(&mut row, &group.columns, representative, &cycle_scope.with("channel", channel.as_str()));
                        }
                    }
                }

                if let Some(group) = &columns.barcoding_dna {
                    for &cycle in &group.cycles {
                        let reference_scope = tile_scope.with("cycle", cycle).with("channel", group.channel.as_str());
                        emit_columns(&mut row, &group.columns, representative, &reference_scope);
                    }
                }

                if let Some(group) = &columns.painting_channels {
                    for channel in &group.channels {
                        emit_columns(&mut row, &group.columns, representative, &tile_scope.with("channel", channel.as_str()));
                    }
                }

                rows.push(row);
            }
        }
        Ok(rows)
    }
}
