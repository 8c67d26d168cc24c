//! Generation orchestrator: pipeline lookup, row selection, strategy dispatch.

use loaddata_types::{LoadDataTable, SampleRow, SampleTable};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    expression::ExpressionError,
    specification::{SpecError, Specification},
    strategy::{GenerationContext, strategy_for},
};

/// Failures that abort generation of one pipeline.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error("pipeline '{pipeline}': filter failed on sample row {row}: {source}")]
    Filter {
        pipeline: String,
        row: usize,
        #[source]
        source: ExpressionError,
    },
}

/// Generates LoadData tables from one immutable specification.
#[derive(Debug, Clone, Copy)]
pub struct Generator<'a> {
    specification: &'a Specification,
}

impl<'a> Generator<'a> {
    pub fn new(specification: &'a Specification) -> Self {
        Self { specification }
    }

    /// Generate the table of `pipeline_id`.
    ///
    /// `base_path` overrides the specification's default. A filter that selects nothing produces an
    /// empty table rather than an error, but every channel set the pipeline names must exist
    /// whatever the selection.
    pub fn generate(&self, pipeline_id: &str, samples: &SampleTable, base_path: Option<&str>) -> Result<LoadDataTable, GenerateError> {
        let pipeline = self.specification.get_pipeline(pipeline_id)?;
        for (_, group) in pipeline.columns.channel_groups() {
            self.specification.get_channels(&group.channels)?;
        }
        let filter = self.specification.row_filter(pipeline_id)?;
        let base_path = base_path.unwrap_or(&self.specification.metadata().base_path);

        let mut selected: Vec<&SampleRow> = Vec::new();
        for (index, sample) in samples.iter().enumerate() {
            let passes = filter.matches(sample).map_err(|source| GenerateError::Filter {
                pipeline: pipeline_id.to_string(),
                row: index + 1,
                source,
            })?;
            if passes && pipeline.includes_cycle(sample.cycle) {
                selected.push(sample);
            }
        }
        debug!(
            pipeline = %pipeline_id,
            filtered = !filter.is_select_all(),
            total = samples.len(),
            selected = selected.len(),
            "selected sample rows"
        );

        let layout = pipeline.layout();
        let context = GenerationContext {
            specification: self.specification,
            pipeline_id,
            pipeline,
            base_path,
        };
        let rows = strategy_for(layout).generate_rows(&context, &selected)?;

        let table = LoadDataTable::new(pipeline_id, rows);
        info!(pipeline = %pipeline_id, name = %pipeline.name, layout = %layout, rows = table.len(), columns = table.columns().len(), "generated LoadData table");
        Ok(table)
    }

    /// Generate every pipeline in specification order, keeping each outcome separate.
    pub fn generate_all(&self, samples: &SampleTable, base_path: Option<&str>) -> Vec<(String, Result<LoadDataTable, GenerateError>)> {
        self.specification
            .pipeline_ids()
            .map(|pipeline_id| (pipeline_id.to_string(), self.generate(pipeline_id, samples, base_path)))
            .collect()
    }
}
