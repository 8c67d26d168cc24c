use loaddata_types::{LoadDataRow, RowLayout, SampleRow};

use super::{GenerationContext, RowStrategy, channel_passes, emit_channel_pass, emit_columns};
use crate::{scope::VariableScope, specification::SpecError};

/// One output row per sample row.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardStrategy;

impl RowStrategy for StandardStrategy {
    fn layout(&self) -> RowLayout {
        RowLayout::Standard
    }

    fn generate_rows(&self, context: &GenerationContext<'_>, samples: &[&SampleRow]) -> Result<Vec<LoadDataRow>, SpecError> {
        let columns = &context.pipeline.columns;
        let passes = channel_passes(
            columns.per_channel.as_ref(),
            columns.per_channel_orig.as_ref(),
            columns.per_channel_illum.as_ref(),
        );

        let mut rows = Vec::with_capacity(samples.len());
        for sample in samples {
            let scope = VariableScope::for_sample(sample, context.base_path);
            let mut row = LoadDataRow::new();
            emit_columns(&mut row, &columns.metadata, sample, &scope);
            for (group, frame) in &passes {
                emit_channel_pass(&mut row, context, group, *frame, sample, &scope, Some(sample.cycle))?;
            }
            rows.push(row);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Specification;
    use indexmap::IndexMap;
    use serde_json::json;

    const SPEC: &str = r#"{
        "metadata": {"description": "standard", "version": "1", "base_path": "/data"},
        "channel_definitions": {"painting": ["DNA", "Phalloidin", "CHN2"]},
        "channel_maps": {"painting": {"DAPI": "DNA", "PhalloAF750": "Phalloidin", "CHN2-AF488": "CHN2"}},
        "pipelines": {
            "2": {
                "name": "apply illum",
                "filter": "",
                "grouping": ["plate", "well", "site"],
                "columns": {
                    "metadata": [
                        {"name": "Metadata_Plate", "source": "plate"},
                        {"name": "Metadata_Site", "source": "site"}
                    ],
                    "per_channel_orig": {
                        "channels": "painting",
                        "columns": [
                            {"name": "FileName_Orig{channel}", "pattern": "{filename}"},
                            {"name": "Frame_Orig{channel}", "value": "channel_index"}
                        ]
                    },
                    "per_channel_illum": {
                        "channels": "painting",
                        "columns": [
                            {"name": "FileName_Illum{channel}", "pattern": "{plate}_Illum{channel}.npy"}
                        ]
                    }
                }
            }
        }
    }"#;

    fn sample(site: i64) -> SampleRow {
        SampleRow {
            path: format!("/images/Plate1/20X_CP/Well_A1_Site{site}.ome.tiff"),
            arm: "painting".into(),
            batch: "Batch1".into(),
            plate: "Plate1".into(),
            well: "A1".into(),
            channels: "PhalloAF750,CHN2-AF488,DAPI".into(),
            site,
            cycle: 1,
            n_frames: 3,
            extra: IndexMap::new(),
        }
    }

    #[test]
    fn emits_all_orig_columns_before_illum_columns() {
        let specification = Specification::from_json_str(SPEC).expect("spec");
        let pipeline = specification.get_pipeline("2").expect("pipeline");
        let context = GenerationContext {
            specification: &specification,
            pipeline_id: "2",
            pipeline,
            base_path: "/data",
        };
        let samples = [sample(0), sample(1)];
        let sample_refs: Vec<&SampleRow> = samples.iter().collect();

        let rows = StandardStrategy.generate_rows(&context, &sample_refs).expect("rows");
        assert_eq!(rows.len(), 2);

        let keys: Vec<&str> = rows[0].keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "Metadata_Plate",
                "Metadata_Site",
                "FileName_OrigDNA",
                "Frame_OrigDNA",
                "FileName_OrigPhalloidin",
                "Frame_OrigPhalloidin",
                "FileName_OrigCHN2",
                "Frame_OrigCHN2",
                "FileName_IllumDNA",
                "FileName_IllumPhalloidin",
                "FileName_IllumCHN2",
            ]
        );
        assert_eq!(rows[1]["Metadata_Site"], json!(1));
        assert_eq!(rows[0]["Frame_OrigDNA"], json!(2));
        assert_eq!(rows[0]["Frame_OrigPhalloidin"], json!(0));
        assert_eq!(rows[0]["FileName_OrigCHN2"], json!("Well_A1_Site0.ome.tiff"));
        assert_eq!(rows[0]["FileName_IllumCHN2"], json!("Plate1_IllumCHN2.npy"));
    }

    const CYCLED_SPEC: &str = r#"{
        "metadata": {"description": "cycled", "version": "1", "base_path": "/data"},
        "channel_definitions": {"painting": ["DNA", "Phalloidin"]},
        "pipelines": {
            "4": {
                "name": "per cycle",
                "filter": "",
                "grouping": ["plate", "well", "site", "cycle"],
                "columns": {
                    "metadata": [{"name": "Metadata_Cycle", "source": "cycle"}],
                    "per_channel": {
                        "channels": "painting",
                        "columns": [{"name": "Frame_Orig{channel}", "value": "channel_index"}],
                        "special_rules": {"DNA": {"only_cycle": 1}}
                    }
                }
            }
        }
    }"#;

    fn cycled_rows(samples: &[SampleRow]) -> Vec<LoadDataRow> {
        let specification = Specification::from_json_str(CYCLED_SPEC).expect("spec");
        let context = GenerationContext {
            specification: &specification,
            pipeline_id: "4",
            pipeline: specification.get_pipeline("4").expect("pipeline"),
            base_path: "/data",
        };
        let sample_refs: Vec<&SampleRow> = samples.iter().collect();
        StandardStrategy.generate_rows(&context, &sample_refs).expect("rows")
    }

    fn acquired(channels: &str, cycle: i64) -> SampleRow {
        SampleRow {
            channels: channels.into(),
            cycle,
            n_frames: 2,
            ..sample(0)
        }
    }

    #[test]
    fn only_cycle_rule_drops_channel_on_other_cycles() {
        let rows = cycled_rows(&[acquired("DNA,Phalloidin", 1), acquired("DNA,Phalloidin", 2)]);

        assert_eq!(rows[0]["Frame_OrigDNA"], json!(0));
        assert_eq!(rows[0]["Frame_OrigPhalloidin"], json!(1));

        assert!(!rows[1].contains_key("Frame_OrigDNA"));
        assert_eq!(rows[1]["Frame_OrigPhalloidin"], json!(1));
    }

    #[test]
    fn frame_index_follows_each_rows_acquisition_order() {
        let rows = cycled_rows(&[acquired("DNA,Phalloidin", 1), acquired("Phalloidin,DNA", 1)]);

        assert_eq!(rows[0]["Frame_OrigDNA"], json!(0));
        assert_eq!(rows[0]["Frame_OrigPhalloidin"], json!(1));
        assert_eq!(rows[1]["Frame_OrigDNA"], json!(1));
        assert_eq!(rows[1]["Frame_OrigPhalloidin"], json!(0));
    }

    #[test]
    fn no_samples_yield_no_rows() {
        let specification = Specification::from_json_str(SPEC).expect("spec");
        let context = GenerationContext {
            specification: &specification,
            pipeline_id: "2",
            pipeline: specification.get_pipeline("2").expect("pipeline"),
            base_path: "/data",
        };
        assert!(StandardStrategy.generate_rows(&context, &[]).expect("rows").is_empty());
    }
}
