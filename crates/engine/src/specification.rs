//! Loaded, validated specification with compiled row filters.

use std::{fs, path::Path};

use indexmap::IndexMap;
use loaddata_types::{
    ChannelGroup, ColumnDefinition, ColumnMode, PipelineDefinition, RowLayout, SpecificationDocument, SpecificationMetadata,
    validate_document,
};
use thiserror::Error;
use tracing::debug;

use crate::{expression::CompiledExpression, filter::RowFilter, templates};

/// Failures raised while loading a specification or looking up its parts.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("failed to read specification {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse specification: {0}")]
    Parse(String),
    #[error("invalid specification: {0}")]
    Validation(String),
    #[error("unknown channel set '{0}'")]
    UnknownChannelSet(String),
    #[error("unknown pipeline '{0}'")]
    UnknownPipeline(String),
}

/// Variables any generation context may bind, beyond the sample fields.
const CONTEXT_VARIABLES: [&str; 7] = ["base_path", "acquisition_folder", "filename", "cycle", "channel", "channel_index", "tile"];

/// Immutable rule set for every pipeline.
#[derive(Debug, Clone)]
pub struct Specification {
    document: SpecificationDocument,
    filters: IndexMap<String, RowFilter>,
}

impl Specification {
    /// Load from a file. `.json` files are parsed as JSON, anything else as YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SpecError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| SpecError::Read {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), bytes = content.len(), "loaded specification file");

        let is_json = path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));
        if is_json { Self::from_json_str(&content) } else { Self::from_yaml_str(&content) }
    }

    /// Syntax errors are [`SpecError::Parse`]; a well-formed document with the wrong shape (missing
    /// fields, a column with zero or several resolution modes) is [`SpecError::Validation`].
    pub fn from_json_str(content: &str) -> Result<Self, SpecError> {
        let raw: serde_json::Value = serde_json::from_str(content).map_err(|error| SpecError::Parse(error.to_string()))?;
        let document = serde_json::from_value(raw).map_err(|error| SpecError::Validation(error.to_string()))?;
        Self::from_document(document)
    }

    /// YAML counterpart of [`Self::from_json_str`], with the same error split.
    pub fn from_yaml_str(content: &str) -> Result<Self, SpecError> {
        let raw: serde_yaml::Value = serde_yaml::from_str(content).map_err(|error| SpecError::Parse(error.to_string()))?;
        let document = serde_yaml::from_value(raw).map_err(|error| SpecError::Validation(error.to_string()))?;
        Self::from_document(document)
    }

    /// Validate `document` and compile every pipeline filter.
    pub fn from_document(document: SpecificationDocument) -> Result<Self, SpecError> {
        validate_document(&document).map_err(SpecError::Validation)?;

        let mut filters = IndexMap::with_capacity(document.pipelines.len());
        for (pipeline_id, pipeline) in &document.pipelines {
            let filter = RowFilter::parse(&pipeline.filter)
                .map_err(|error| SpecError::Validation(format!("pipeline '{}': invalid filter: {}", pipeline_id, error)))?;
            filters.insert(pipeline_id.clone(), filter);
        }

        Ok(Self { document, filters })
    }

    pub fn document(&self) -> &SpecificationDocument {
        &self.document
    }

    pub fn metadata(&self) -> &SpecificationMetadata {
        &self.document.metadata
    }

    /// Ordered channel list of a named channel set.
    pub fn get_channels(&self, name: &str) -> Result<&[String], SpecError> {
        self.document
            .channel_definitions
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| SpecError::UnknownChannelSet(name.to_string()))
    }

    pub fn get_pipeline(&self, pipeline_id: &str) -> Result<&PipelineDefinition, SpecError> {
        self.document
            .pipelines
            .get(pipeline_id)
            .ok_or_else(|| SpecError::UnknownPipeline(pipeline_id.to_string()))
    }

    pub fn row_filter(&self, pipeline_id: &str) -> Result<&RowFilter, SpecError> {
        self.filters
            .get(pipeline_id)
            .ok_or_else(|| SpecError::UnknownPipeline(pipeline_id.to_string()))
    }

    /// Acquired-to-canonical channel renames for `arm`, if the arm has any.
    pub fn channel_map(&self, arm: &str) -> Option<&IndexMap<String, String>> {
        self.document.channel_maps.get(arm)
    }

    pub fn pipeline_ids(&self) -> impl Iterator<Item = &str> {
        self.document.pipelines.keys().map(String::as_str)
    }

    /// Non-fatal findings: groups naming undefined channel sets, placeholders or expression names no
    /// generation context can bind, filters naming non-sample fields, and pipelines with conflicting
    /// layout flags.
    pub fn diagnostics(&self) -> Vec<String> {
        let mut findings = Vec::new();

        for (pipeline_id, pipeline) in &self.document.pipelines {
            if pipeline.wide_format && pipeline.synthetic_tiles {
                findings.push(format!(
                    "pipeline '{}': both wide_format and synthetic_tiles are set; {} layout is used",
                    pipeline_id,
                    RowLayout::SyntheticTiles
                ));
            }

            if let Some(filter) = self.filters.get(pipeline_id) {
                for name in filter.names() {
                    if !loaddata_types::SAMPLE_FIELDS.contains(&name.as_str()) {
                        findings.push(format!(
                            "pipeline '{}': filter references '{}', which only a samplesheet column of that name provides",
                            pipeline_id, name
                        ));
                    }
                }
            }

            for (key, group) in pipeline.columns.channel_groups() {
                if self.get_channels(&group.channels).is_err() {
                    findings.push(format!(
                        "pipeline '{}': {} references undefined channel set '{}'",
                        pipeline_id, key, group.channels
                    ));
                }
                findings.extend(self.special_rule_findings(pipeline_id, key, group));
            }

            for column in pipeline.columns.all_columns() {
                findings.extend(self.column_findings(pipeline_id, pipeline, column));
            }
        }

        findings
    }

    fn special_rule_findings(&self, pipeline_id: &str, key: &str, group: &ChannelGroup) -> Vec<String> {
        let Ok(channels) = self.get_channels(&group.channels) else {
            return Vec::new();
        };
        group
            .special_rules
            .keys()
            .filter(|channel| !channels.contains(channel))
            .map(|channel| format!("pipeline '{}': {} has a special rule for '{}' outside its channel set", pipeline_id, key, channel))
            .collect()
    }

    fn column_findings(&self, pipeline_id: &str, pipeline: &PipelineDefinition, column: &ColumnDefinition) -> Vec<String> {
        let mut referenced = templates::placeholders(&column.name);
        match &column.mode {
            ColumnMode::Pattern(pattern) => referenced.extend(templates::placeholders(pattern)),
            ColumnMode::Expression(source) => match CompiledExpression::parse(source) {
                Ok(expression) => referenced.extend(expression.names()),
                Err(error) => {
                    return vec![format!(
                        "pipeline '{}': column '{}' has an invalid expression: {}",
                        pipeline_id, column.name, error
                    )];
                }
            },
            ColumnMode::Source(_) | ColumnMode::Value(_) => {}
        }

        let mut unknown: Vec<String> = Vec::new();
        for name in referenced {
            if !is_bindable(&name, pipeline) && !unknown.contains(&name) {
                unknown.push(name);
            }
        }
        unknown
            .into_iter()
            .map(|name| format!("pipeline '{}': column '{}' references '{}' which no scope provides", pipeline_id, column.name, name))
            .collect()
    }
}

fn is_bindable(name: &str, pipeline: &PipelineDefinition) -> bool {
    loaddata_types::SAMPLE_FIELDS.contains(&name)
        || CONTEXT_VARIABLES.contains(&name)
        || pipeline.grouping.iter().any(|field| field == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"{
        "metadata": {"description": "demo", "version": "2.0", "base_path": "/data"},
        "channel_definitions": {"painting": ["DNA", "Phalloidin"]},
        "channel_maps": {"painting": {"DAPI": "DNA"}},
        "pipelines": {
            "1": {
                "name": "illum",
                "filter": "arm == 'painting'",
                "grouping": ["plate"],
                "columns": {
                    "metadata": [{"name": "Metadata_Plate", "source": "plate"}],
                    "per_channel": {
                        "channels": "painting",
                        "columns": [{"name": "FileName_Orig{channel}", "pattern": "{filename}"}]
                    }
                }
            }
        }
    }"#;

    #[test]
    fn loads_and_looks_up() {
        let specification = Specification::from_json_str(DOCUMENT).expect("valid");
        assert_eq!(specification.metadata().version, "2.0");
        assert_eq!(specification.get_channels("painting").expect("set"), ["DNA", "Phalloidin"]);
        assert_eq!(specification.get_pipeline("1").expect("pipeline").name, "illum");
        assert_eq!(specification.channel_map("painting").and_then(|map| map.get("DAPI")).map(String::as_str), Some("DNA"));
        assert_eq!(specification.pipeline_ids().collect::<Vec<_>>(), vec!["1"]);
        assert!(specification.diagnostics().is_empty(), "{:?}", specification.diagnostics());
    }

    #[test]
    fn lookups_fail_with_named_errors() {
        let specification = Specification::from_json_str(DOCUMENT).expect("valid");
        assert!(matches!(specification.get_channels("barcoding"), Err(SpecError::UnknownChannelSet(name)) if name == "barcoding"));
        assert!(matches!(specification.get_pipeline("99"), Err(SpecError::UnknownPipeline(id)) if id == "99"));
    }

    #[test]
    fn column_mode_violations_are_validation_errors() {
        let document = DOCUMENT.replace(r#""source": "plate""#, r#""note": "x""#);
        let error = Specification::from_json_str(&document).expect_err("no mode");
        assert!(matches!(error, SpecError::Validation(ref message) if message.contains("must specify one of")), "{error}");

        let document = DOCUMENT.replace(r#""source": "plate""#, r#""source": "plate", "pattern": "{plate}""#);
        let error = Specification::from_json_str(&document).expect_err("two modes");
        assert!(matches!(error, SpecError::Validation(ref message) if message.contains("more than one")), "{error}");

        let yaml = "metadata: {description: x, version: '1', base_path: /}\nchannel_definitions: {}\npipelines:\n  '1': {name: p, columns: {metadata: [{name: Metadata_Plate}]}}\n";
        let error = Specification::from_yaml_str(yaml).expect_err("yaml without mode");
        assert!(matches!(error, SpecError::Validation(ref message) if message.contains("must specify one of")), "{error}");
    }

    #[test]
    fn syntax_errors_are_parse_errors() {
        assert!(matches!(Specification::from_json_str("{\"metadata\": "), Err(SpecError::Parse(_))));
        assert!(matches!(Specification::from_yaml_str("metadata: [unterminated\n"), Err(SpecError::Parse(_))));
    }

    #[test]
    fn malformed_filter_is_a_validation_error() {
        let document = DOCUMENT.replace("arm == 'painting'", "arm == ");
        let error = Specification::from_json_str(&document).expect_err("bad filter");
        assert!(matches!(error, SpecError::Validation(ref message) if message.contains("invalid filter")), "{error}");
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let error = Specification::from_yaml_str("metadata: {description: x, version: '1', base_path: /}\npipelines: {}\n").expect_err("missing");
        assert!(matches!(error, SpecError::Validation(ref message) if message.contains("channel_definitions")), "{error}");
    }

    #[test]
    fn load_reads_json_and_yaml_files() {
        let directory = tempfile::tempdir().expect("tempdir");
        let json_path = directory.path().join("spec.json");
        fs::write(&json_path, DOCUMENT).expect("write json");
        assert!(Specification::load(&json_path).is_ok());

        let yaml_path = directory.path().join("spec.yaml");
        let yaml = serde_yaml::to_string(Specification::from_json_str(DOCUMENT).expect("valid").document()).expect("to yaml");
        fs::write(&yaml_path, yaml).expect("write yaml");
        let reloaded = Specification::load(&yaml_path).expect("yaml loads");
        assert_eq!(reloaded.document(), Specification::from_json_str(DOCUMENT).expect("valid").document());

        assert!(matches!(Specification::load(directory.path().join("missing.json")), Err(SpecError::Read { .. })));
    }

    #[test]
    fn diagnostics_report_undefined_sets_and_names() {
        let document = DOCUMENT
            .replace(r#""channels": "painting""#, r#""channels": "barcoding""#)
            .replace("{filename}", "{filename}_{magnification}");
        let specification = Specification::from_json_str(&document).expect("lookups are lazy");
        let findings = specification.diagnostics();
        assert_eq!(findings.len(), 2, "{findings:?}");
        assert!(findings[0].contains("undefined channel set 'barcoding'"));
        assert!(findings[1].contains("'magnification'"));
    }

    #[test]
    fn diagnostics_report_filter_fields_outside_the_samplesheet_model() {
        let document = DOCUMENT.replace("arm == 'painting'", "arm == 'painting' and magnification == '20X'");
        let specification = Specification::from_json_str(&document).expect("valid");
        let findings = specification.diagnostics();
        assert_eq!(findings.len(), 1, "{findings:?}");
        assert!(findings[0].contains("filter references 'magnification'"), "{findings:?}");
    }
}
