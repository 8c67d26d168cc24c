//! Structural checks applied to a specification document after deserialization.
//!
//! Serde already rejects missing fields and ambiguous column definitions. The rules here cover
//! constraints that span several fields or that serde cannot express.

use super::{CycleSelection, PipelineDefinition, SpecificationDocument};

/// Validate a freshly parsed document, returning the first violation found.
pub fn validate_document(document: &SpecificationDocument) -> Result<(), String> {
    for (set_name, channels) in &document.channel_definitions {
        if channels.is_empty() {
            return Err(format!("channel set '{}' must list at least one channel", set_name));
        }
        if let Some(blank) = channels.iter().position(|channel| channel.trim().is_empty()) {
            return Err(format!("channel set '{}' has an empty channel name at position {}", set_name, blank));
        }
    }

    for (arm, map) in &document.channel_maps {
        for (acquired, canonical) in map {
            if acquired.trim().is_empty() || canonical.trim().is_empty() {
                return Err(format!("channel map for arm '{}' contains an empty channel name", arm));
            }
        }
    }

    for (pipeline_id, pipeline) in &document.pipelines {
        validate_pipeline(pipeline).map_err(|message| format!("pipeline '{}': {}", pipeline_id, message))?;
    }

    Ok(())
}

fn validate_pipeline(pipeline: &PipelineDefinition) -> Result<(), String> {
    if pipeline.grouping.iter().any(|field| field.trim().is_empty()) {
        return Err("grouping entries cannot be empty".to_string());
    }

    if pipeline.tiles_per_well == Some(0) {
        return Err("tiles_per_well must be positive".to_string());
    }

    if let Some(CycleSelection::Only(cycles)) = &pipeline.cycles
        && cycles.is_empty()
    {
        return Err("cycles must list at least one cycle or be \"all\"".to_string());
    }

    for (key, group) in pipeline.columns.channel_groups() {
        if group.channels.trim().is_empty() {
            return Err(format!("{} must name a channel set", key));
        }
    }

    if let Some(group) = &pipeline.columns.barcoding_channels
        && (group.cycles.is_empty() || group.channels.is_empty())
    {
        return Err("barcoding_channels needs at least one cycle and one channel".to_string());
    }

    if let Some(group) = &pipeline.columns.painting_channels
        && group.channels.is_empty()
    {
        return Err("painting_channels needs at least one channel".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> SpecificationDocument {
        serde_yaml::from_str(yaml).expect("document parses")
    }

    const BASE: &str = r#"
metadata:
  description: test
  version: "1.0"
  base_path: /data
channel_definitions:
  painting: [DNA, Phalloidin]
pipelines:
  "1":
    name: illum calc
    filter: "arm == 'painting'"
    grouping: [plate]
    columns:
      metadata:
        - name: Metadata_Plate
          source: plate
"#;

    #[test]
    fn accepts_minimal_document() {
        assert_eq!(validate_document(&parse(BASE)), Ok(()));
    }

    #[test]
    fn rejects_zero_tiles() {
        let mut document = parse(BASE);
        document.pipelines["1"].tiles_per_well = Some(0);
        let error = validate_document(&document).expect_err("zero tiles");
        assert_eq!(error, "pipeline '1': tiles_per_well must be positive");
    }

    #[test]
    fn rejects_empty_channel_set() {
        let mut document = parse(BASE);
        document.channel_definitions.insert("empty".into(), Vec::new());
        let error = validate_document(&document).expect_err("empty set");
        assert!(error.contains("'empty'"), "{error}");
    }

    #[test]
    fn rejects_blank_grouping_field() {
        let mut document = parse(BASE);
        document.pipelines["1"].grouping.push("  ".into());
        assert!(validate_document(&document).is_err());
    }
}
