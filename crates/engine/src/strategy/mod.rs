//! Row generation strategies.
//!
//! A pipeline's capability flags pick one [`RowStrategy`]; the strategy folds the filtered sample
//! rows into output rows. New pipelines compose through the specification, never through new
//! dispatch code.

mod standard;
mod synthetic;
mod wide;

use loaddata_types::{ChannelGroup, ColumnDefinition, LoadDataRow, PipelineDefinition, RowLayout, SampleRow};

pub use standard::StandardStrategy;
pub use synthetic::SyntheticTileStrategy;
pub use wide::WideFormatStrategy;

use crate::{channels::ChannelOrder, resolve::resolve_column, scope::VariableScope, specification::SpecError, Specification};

/// Everything a strategy needs besides the sample rows.
#[derive(Debug, Clone, Copy)]
pub struct GenerationContext<'a> {
    pub specification: &'a Specification,
    pub pipeline_id: &'a str,
    pub pipeline: &'a PipelineDefinition,
    pub base_path: &'a str,
}

/// Turns filtered sample rows into output rows.
pub trait RowStrategy: Send + Sync {
    fn layout(&self) -> RowLayout;

    /// Generate the rows for `samples`, which are already filtered and cycle-selected.
    fn generate_rows(&self, context: &GenerationContext<'_>, samples: &[&SampleRow]) -> Result<Vec<LoadDataRow>, SpecError>;
}

/// The strategy implementing `layout`.
pub fn strategy_for(layout: RowLayout) -> &'static dyn RowStrategy {
    match layout {
        RowLayout::Standard => &StandardStrategy,
        RowLayout::WideFormat => &WideFormatStrategy,
        RowLayout::SyntheticTiles => &SyntheticTileStrategy,
    }
}

/// Frame index bound to `channel_index` during a channel pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameIndex {
    /// Position of the channel in the row's acquisition order.
    Acquired,
    /// Fixed index, used by illumination columns which have no frame concept.
    Fixed(usize),
}

/// Channel passes for a family of groups, in emission order.
///
/// Split `orig`/`illum` groups each get a full pass, orig first. The combined group is only used
/// when neither split group is declared.
pub(crate) fn channel_passes<'a>(
    combined: Option<&'a ChannelGroup>,
    orig: Option<&'a ChannelGroup>,
    illum: Option<&'a ChannelGroup>,
) -> Vec<(&'a ChannelGroup, FrameIndex)> {
    if orig.is_none() && illum.is_none() {
        return combined.map(|group| (group, FrameIndex::Acquired)).into_iter().collect();
    }
    orig.map(|group| (group, FrameIndex::Acquired))
        .into_iter()
        .chain(illum.map(|group| (group, FrameIndex::Fixed(0))))
        .collect()
}

/// Resolve `columns` into `row`. Later columns with the same expanded name overwrite earlier ones.
pub(crate) fn emit_columns(row: &mut LoadDataRow, columns: &[ColumnDefinition], sample: &SampleRow, scope: &VariableScope) {
    for definition in columns {
        let (name, value) = resolve_column(definition, sample, scope);
        row.insert(name, value);
    }
}

/// One pass over the canonical channels of `group`.
///
/// When `cycle` is known, channels whose special rules exclude that cycle are skipped entirely, so
/// their columns are absent from the row rather than blank.
pub(crate) fn emit_channel_pass(
    row: &mut LoadDataRow,
    context: &GenerationContext<'_>,
    group: &ChannelGroup,
    frame: FrameIndex,
    sample: &SampleRow,
    scope: &VariableScope,
    cycle: Option<i64>,
) -> Result<(), SpecError> {
    let canonical = context.specification.get_channels(&group.channels)?;
    let order = ChannelOrder::for_sample(canonical, sample, context.specification.channel_map(&sample.arm));

    for channel in canonical {
        if let Some(cycle) = cycle
            && !group.allows(channel, cycle)
        {
            continue;
        }
        let channel_index = match frame {
            FrameIndex::Acquired => order.resolve(channel),
            FrameIndex::Fixed(index) => index,
        };
        let channel_scope = scope.with("channel", channel.as_str()).with("channel_index", channel_index as u64);
        emit_columns(row, &group.columns, sample, &channel_scope);
    }
    Ok(())
}
