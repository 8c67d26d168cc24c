//! Strongly typed LoadData specification schema.
//!
//! The document describes, per pipeline, which sample rows are selected and how every output
//! column is synthesised. Maps preserve authoring order (via `IndexMap`) because column groups are
//! emitted in the order they are declared and downstream consumers rely on that order.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub mod validation;

/// Number of synthetic tiles generated per well when a pipeline does not declare one.
pub const DEFAULT_TILES_PER_WELL: u32 = 4;

/// Root of a specification file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpecificationDocument {
    /// Descriptive metadata and the default base path.
    pub metadata: SpecificationMetadata,
    /// Named channel sets, each an ordered list of canonical channel names.
    pub channel_definitions: IndexMap<String, Vec<String>>,
    /// Per-arm maps from acquired channel names to canonical channel names.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub channel_maps: IndexMap<String, IndexMap<String, String>>,
    /// Pipeline definitions keyed by pipeline identifier.
    pub pipelines: IndexMap<String, PipelineDefinition>,
    /// Human readable documentation for symbolic values such as `channel_index`.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub special_values: IndexMap<String, String>,
}

/// Descriptive metadata attached to a specification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpecificationMetadata {
    pub description: String,
    pub version: String,
    /// Default base path substituted for `{base_path}`.
    pub base_path: String,
}

/// Complete definition for a single pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineDefinition {
    /// Human readable pipeline name.
    pub name: String,
    /// Row predicate over sample fields. Empty selects every row.
    #[serde(default)]
    pub filter: String,
    /// Fields the downstream pipeline groups by.
    #[serde(default)]
    pub grouping: Vec<String>,
    /// Column synthesis rules.
    pub columns: ColumnSet,
    /// Fold every cycle of one (well, site) into a single row.
    #[serde(default)]
    pub wide_format: bool,
    /// Emit rows for stitched tiles instead of acquired images.
    #[serde(default)]
    pub synthetic_tiles: bool,
    /// Restricts the cycles handed to the row strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycles: Option<CycleSelection>,
    /// Tile count for synthetic tile generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiles_per_well: Option<u32>,
}

impl PipelineDefinition {
    /// Row layout selected by the capability flags. Synthetic tiles take precedence over wide format.
    pub fn layout(&self) -> RowLayout {
        if self.synthetic_tiles {
            RowLayout::SyntheticTiles
        } else if self.wide_format {
            RowLayout::WideFormat
        } else {
            RowLayout::Standard
        }
    }

    /// Effective number of synthetic tiles per well.
    pub fn tile_count(&self) -> u32 {
        self.tiles_per_well.unwrap_or(DEFAULT_TILES_PER_WELL)
    }

    /// Whether rows from `cycle` are handed to the row strategy.
    pub fn includes_cycle(&self, cycle: i64) -> bool {
        match &self.cycles {
            None | Some(CycleSelection::All) => true,
            Some(CycleSelection::Only(cycles)) => cycles.contains(&cycle),
        }
    }
}

/// Shape of the rows produced for a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowLayout {
    /// One output row per sample row.
    Standard,
    /// One output row per (well, site), all cycles side by side.
    WideFormat,
    /// `tiles_per_well` rows per well, unrelated to acquisition sites.
    SyntheticTiles,
}

impl fmt::Display for RowLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RowLayout::Standard => "standard",
            RowLayout::WideFormat => "wide-format",
            RowLayout::SyntheticTiles => "synthetic-tile",
        };
        f.write_str(label)
    }
}

/// Which cycles a pipeline consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCycleSelection", into = "RawCycleSelection")]
pub enum CycleSelection {
    All,
    Only(Vec<i64>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawCycleSelection {
    Keyword(String),
    List(Vec<i64>),
}

impl TryFrom<RawCycleSelection> for CycleSelection {
    type Error = String;

    fn try_from(raw: RawCycleSelection) -> Result<Self, Self::Error> {
        match raw {
            RawCycleSelection::Keyword(keyword) if keyword == "all" => Ok(CycleSelection::All),
            RawCycleSelection::Keyword(keyword) => Err(format!("cycles must be \"all\" or a list of integers, got \"{keyword}\"")),
            RawCycleSelection::List(cycles) => Ok(CycleSelection::Only(cycles)),
        }
    }
}

impl From<CycleSelection> for RawCycleSelection {
    fn from(selection: CycleSelection) -> Self {
        match selection {
            CycleSelection::All => RawCycleSelection::Keyword("all".to_string()),
            CycleSelection::Only(cycles) => RawCycleSelection::List(cycles),
        }
    }
}

/// Metadata columns plus the optional column groups of a pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ColumnSet {
    pub metadata: Vec<ColumnDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_channel: Option<ChannelGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_channel_orig: Option<ChannelGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_channel_illum: Option<ChannelGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_cycle_per_channel: Option<ChannelGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_cycle_per_channel_orig: Option<ChannelGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_cycle_per_channel_illum: Option<ChannelGroup>,
    /// Cycle x channel cross product for synthetic tiles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcoding_channels: Option<CycleChannelGroup>,
    /// Reference channel block for synthetic tiles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcoding_dna: Option<ReferenceChannelGroup>,
    /// Channel-only cross product for synthetic tiles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub painting_channels: Option<ChannelListGroup>,
}

impl ColumnSet {
    /// Iterates every column definition of the set, metadata first.
    pub fn all_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        let channel_groups = [
            &self.per_channel,
            &self.per_channel_orig,
            &self.per_channel_illum,
            &self.per_cycle_per_channel,
            &self.per_cycle_per_channel_orig,
            &self.per_cycle_per_channel_illum,
        ];
        self.metadata
            .iter()
            .chain(channel_groups.into_iter().flatten().flat_map(|group| group.columns.iter()))
            .chain(self.barcoding_channels.iter().flat_map(|group| group.columns.iter()))
            .chain(self.barcoding_dna.iter().flat_map(|group| group.columns.iter()))
            .chain(self.painting_channels.iter().flat_map(|group| group.columns.iter()))
    }

    /// Channel groups that reference a named channel set, with their JSON keys.
    pub fn channel_groups(&self) -> Vec<(&'static str, &ChannelGroup)> {
        [
            ("per_channel", &self.per_channel),
            ("per_channel_orig", &self.per_channel_orig),
            ("per_channel_illum", &self.per_channel_illum),
            ("per_cycle_per_channel", &self.per_cycle_per_channel),
            ("per_cycle_per_channel_orig", &self.per_cycle_per_channel_orig),
            ("per_cycle_per_channel_illum", &self.per_cycle_per_channel_illum),
        ]
        .into_iter()
        .filter_map(|(key, group)| group.as_ref().map(|group| (key, group)))
        .collect()
    }
}

/// Columns repeated for every channel of a named channel set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelGroup {
    /// Name of a set in `channel_definitions`.
    pub channels: String,
    pub columns: Vec<ColumnDefinition>,
    /// Per-channel restrictions keyed by canonical channel name.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub special_rules: IndexMap<String, ChannelRule>,
}

impl ChannelGroup {
    /// Whether `channel` is emitted for `cycle`.
    pub fn allows(&self, channel: &str, cycle: i64) -> bool {
        self.special_rules.get(channel).map(|rule| rule.allows(cycle)).unwrap_or(true)
    }
}

/// Restriction attached to one channel of a group.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelRule {
    /// The channel only exists at this cycle; every other cycle omits its columns entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only_cycle: Option<i64>,
}

impl ChannelRule {
    pub fn allows(&self, cycle: i64) -> bool {
        self.only_cycle.is_none_or(|only_cycle| only_cycle == cycle)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleChannelGroup {
    pub cycles: Vec<i64>,
    pub channels: Vec<String>,
    pub columns: Vec<ColumnDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferenceChannelGroup {
    #[serde(default = "default_reference_cycles")]
    pub cycles: Vec<i64>,
    #[serde(default = "default_reference_channel")]
    pub channel: String,
    pub columns: Vec<ColumnDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelListGroup {
    pub channels: Vec<String>,
    pub columns: Vec<ColumnDefinition>,
}

fn default_reference_cycles() -> Vec<i64> {
    vec![1]
}

fn default_reference_channel() -> String {
    "DNA".to_string()
}

/// A single output column: a name template plus exactly one resolution mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RawColumnDefinition", into = "RawColumnDefinition")]
pub struct ColumnDefinition {
    /// Column name template, e.g. `PathName_Cycle{cycle:02d}_Orig{channel}`.
    pub name: String,
    pub mode: ColumnMode,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, mode: ColumnMode) -> Self {
        Self { name: name.into(), mode }
    }

    pub fn source(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(name, ColumnMode::Source(field.into()))
    }

    pub fn pattern(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(name, ColumnMode::Pattern(pattern.into()))
    }

    pub fn value(name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self::new(name, ColumnMode::Value(value.into()))
    }

    pub fn expression(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::new(name, ColumnMode::Expression(expression.into()))
    }
}

/// How a cell value is resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnMode {
    /// Field looked up in the sample row, then in the variable scope.
    Source(String),
    /// Template expanded against the variable scope.
    Pattern(String),
    /// Literal, or a symbolic variable such as `channel_index` or `tile`.
    Value(JsonValue),
    /// Formula evaluated by the expression language.
    Expression(String),
}

impl ColumnMode {
    pub fn kind(&self) -> &'static str {
        match self {
            ColumnMode::Source(_) => "source",
            ColumnMode::Pattern(_) => "pattern",
            ColumnMode::Value(_) => "value",
            ColumnMode::Expression(_) => "expression",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawColumnDefinition {
    #[serde(default)]
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expression: Option<String>,
}

impl TryFrom<RawColumnDefinition> for ColumnDefinition {
    type Error = String;

    fn try_from(raw: RawColumnDefinition) -> Result<Self, Self::Error> {
        if raw.name.trim().is_empty() {
            return Err("column name cannot be empty".to_string());
        }

        let mut modes = Vec::new();
        if let Some(source) = raw.source {
            modes.push(ColumnMode::Source(source));
        }
        if let Some(pattern) = raw.pattern {
            modes.push(ColumnMode::Pattern(pattern));
        }
        if let Some(value) = raw.value {
            if value.is_null() || value.is_array() || value.is_object() {
                return Err(format!("column '{}': value must be a string, number, or boolean", raw.name));
            }
            modes.push(ColumnMode::Value(value));
        }
        if let Some(expression) = raw.expression {
            modes.push(ColumnMode::Expression(expression));
        }

        match modes.len() {
            0 => Err(format!(
                "column '{}' must specify one of: source, pattern, value, expression",
                raw.name
            )),
            1 => Ok(ColumnDefinition {
                name: raw.name,
                mode: modes.remove(0),
            }),
            _ => {
                let kinds: Vec<&str> = modes.iter().map(ColumnMode::kind).collect();
                Err(format!(
                    "column '{}' specifies more than one resolution mode: {}",
                    raw.name,
                    kinds.join(", ")
                ))
            }
        }
    }
}

impl From<ColumnDefinition> for RawColumnDefinition {
    fn from(definition: ColumnDefinition) -> Self {
        let mut raw = RawColumnDefinition {
            name: definition.name,
            ..RawColumnDefinition::default()
        };
        match definition.mode {
            ColumnMode::Source(source) => raw.source = Some(source),
            ColumnMode::Pattern(pattern) => raw.pattern = Some(pattern),
            ColumnMode::Value(value) => raw.value = Some(value),
            ColumnMode::Expression(expression) => raw.expression = Some(expression),
        }
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn column_definition_accepts_exactly_one_mode() {
        let definition: ColumnDefinition = serde_json::from_value(json!({
            "name": "Frame_Orig{channel}",
            "value": "channel_index"
        }))
        .expect("valid column");
        assert_eq!(definition.mode, ColumnMode::Value(json!("channel_index")));

        let numeric: ColumnDefinition = serde_json::from_value(json!({"name": "Frame_IllumDNA", "value": 0})).expect("numeric literal");
        assert_eq!(numeric.mode, ColumnMode::Value(json!(0)));
    }

    #[test]
    fn column_definition_without_mode_is_rejected() {
        let error = serde_json::from_value::<ColumnDefinition>(json!({"name": "Metadata_Plate"})).expect_err("missing mode");
        assert!(error.to_string().contains("must specify one of"), "{error}");
    }

    #[test]
    fn column_definition_with_two_modes_is_rejected() {
        let error = serde_json::from_value::<ColumnDefinition>(json!({
            "name": "Metadata_Plate",
            "source": "plate",
            "pattern": "{plate}"
        }))
        .expect_err("ambiguous mode");
        assert!(error.to_string().contains("source, pattern"), "{error}");
    }

    #[test]
    fn column_definition_with_empty_name_is_rejected() {
        let error = serde_json::from_value::<ColumnDefinition>(json!({"name": "", "source": "plate"})).expect_err("empty name");
        assert!(error.to_string().contains("cannot be empty"));
    }

    #[test]
    fn column_definition_serializes_back_to_authoring_shape() {
        let definition = ColumnDefinition::pattern("PathName_Illum{channel}", "{base_path}/illum/{plate}");
        let value = serde_json::to_value(&definition).expect("serialize");
        assert_eq!(value, json!({"name": "PathName_Illum{channel}", "pattern": "{base_path}/illum/{plate}"}));
    }

    #[test]
    fn cycle_selection_parses_keyword_and_list() {
        let all: CycleSelection = serde_json::from_value(json!("all")).expect("all");
        assert_eq!(all, CycleSelection::All);
        let only: CycleSelection = serde_json::from_value(json!([1, 3])).expect("list");
        assert_eq!(only, CycleSelection::Only(vec![1, 3]));
        assert!(serde_json::from_value::<CycleSelection>(json!("some")).is_err());
    }

    #[test]
    fn layout_prefers_synthetic_tiles() {
        let mut pipeline = PipelineDefinition {
            name: "combined".into(),
            filter: String::new(),
            grouping: Vec::new(),
            columns: ColumnSet::default(),
            wide_format: true,
            synthetic_tiles: true,
            cycles: None,
            tiles_per_well: None,
        };
        assert_eq!(pipeline.layout(), RowLayout::SyntheticTiles);
        assert_eq!(pipeline.tile_count(), DEFAULT_TILES_PER_WELL);

        pipeline.synthetic_tiles = false;
        assert_eq!(pipeline.layout(), RowLayout::WideFormat);
        pipeline.wide_format = false;
        assert_eq!(pipeline.layout(), RowLayout::Standard);
    }

    #[test]
    fn only_cycle_rule_restricts_channel() {
        let group: ChannelGroup = serde_yaml::from_str(
            r#"
channels: barcoding
columns:
  - name: "PathName_Cycle{cycle:02d}_{channel}"
    pattern: "{base_path}/aligned"
special_rules:
  DNA:
    only_cycle: 1
"#,
        )
        .expect("group");
        assert!(group.allows("DNA", 1));
        assert!(!group.allows("DNA", 2));
        assert!(group.allows("A", 2));
    }
}
