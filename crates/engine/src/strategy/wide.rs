use std::collections::{BTreeMap, BTreeSet};

use loaddata_types::{LoadDataRow, RowLayout, SampleRow};
use tracing::debug;

use super::{GenerationContext, RowStrategy, channel_passes, emit_channel_pass, emit_columns};
use crate::{scope::VariableScope, specification::SpecError};

/// One output row per (well, site), every cycle folded side by side.
///
/// Rows are emitted in (well, site) order. Within a row the metadata comes first, then each
/// channel pass walks all cycles in ascending order before the next pass starts.
#[derive(Debug, Clone, Copy, Default)]
pub struct WideFormatStrategy;

impl RowStrategy for WideFormatStrategy {
    fn layout(&self) -> RowLayout {
        RowLayout::WideFormat
    }

    fn generate_rows(&self, context: &GenerationContext<'_>, samples: &[&SampleRow]) -> Result<Vec<LoadDataRow>, SpecError> {
        let columns = &context.pipeline.columns;
        let passes = channel_passes(
            columns.per_cycle_per_channel.as_ref(),
            columns.per_cycle_per_channel_orig.as_ref(),
            columns.per_cycle_per_channel_illum.as_ref(),
        );

        let mut groups: BTreeMap<(&str, i64), Vec<&SampleRow>> = BTreeMap::new();
        for sample in samples {
            groups.entry((sample.well.as_str(), sample.site)).or_default().push(sample);
        }

        debug!(pipeline = %context.pipeline_id, samples = samples.len(), groups = groups.len(), "folded samples into well/site groups");

        let mut rows = Vec::with_capacity(groups.len());
        for ((well, site), members) in groups {
            let Some(representative) = members.first().copied() else {
                continue;
            };

            let mut group_scope = VariableScope::new();
            group_scope.insert("base_path", context.base_path);
            group_scope.insert("batch", representative.batch.as_str());
            group_scope.insert("plate", representative.plate.as_str());
            group_scope.insert("well", well);
            group_scope.insert("site", site);

            let mut row = LoadDataRow::new();
            emit_columns(&mut row, &columns.metadata, representative, &group_scope);

            let cycles: BTreeSet<i64> = members.iter().map(|sample| sample.cycle).collect();
            for (group, frame) in &passes {
                for &cycle in &cycles {
                    let Some(cycle_sample) = members.iter().copied().find(|sample| sample.cycle == cycle) else {
                        continue;
                    };
                    let mut cycle_scope = group_scope.with("cycle", cycle);
                    cycle_scope.insert("acquisition_folder", cycle_sample.acquisition_folder());
                    cycle_scope.insert("filename", cycle_sample.filename());
                    emit_channel_pass(&mut row, context, group, *frame, cycle_sample, &cycle_scope, Some(cycle))?;
                }
            }
            rows.push(row);
        }
        Ok(rows)
    }
}
