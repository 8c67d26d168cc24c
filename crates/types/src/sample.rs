//! Sample rows: one record per acquired image.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Built-in sample fields, in samplesheet column order.
pub const SAMPLE_FIELDS: [&str; 9] = ["path", "arm", "batch", "plate", "well", "channels", "site", "cycle", "n_frames"];

/// One acquired-image record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRow {
    /// Full path to the image file.
    pub path: String,
    /// Experimental arm, `painting` or `barcoding`.
    pub arm: String,
    #[serde(default)]
    pub batch: String,
    pub plate: String,
    pub well: String,
    /// Comma-joined channel names in acquisition order.
    pub channels: String,
    pub site: i64,
    #[serde(default = "default_cycle")]
    pub cycle: i64,
    pub n_frames: i64,
    /// Additional samplesheet columns, kept verbatim.
    #[serde(default, flatten)]
    pub extra: IndexMap<String, String>,
}

fn default_cycle() -> i64 {
    1
}

impl SampleRow {
    /// Looks up a field by name, built-in fields first, then extra columns.
    pub fn field(&self, name: &str) -> Option<Value> {
        let value = match name {
            "path" => Value::from(self.path.as_str()),
            "arm" => Value::from(self.arm.as_str()),
            "batch" => Value::from(self.batch.as_str()),
            "plate" => Value::from(self.plate.as_str()),
            "well" => Value::from(self.well.as_str()),
            "channels" => Value::from(self.channels.as_str()),
            "site" => Value::from(self.site),
            "cycle" => Value::from(self.cycle),
            "n_frames" => Value::from(self.n_frames),
            other => return self.extra.get(other).map(|value| Value::from(value.as_str())),
        };
        Some(value)
    }

    /// All fields in a stable order: built-ins then extra columns.
    pub fn fields(&self) -> Vec<(String, Value)> {
        let mut fields: Vec<(String, Value)> = SAMPLE_FIELDS
            .iter()
            .filter_map(|name| self.field(name).map(|value| (name.to_string(), value)))
            .collect();
        fields.extend(self.extra.iter().map(|(key, value)| (key.clone(), Value::from(value.as_str()))));
        fields
    }

    /// Channel names in acquisition order, trimmed, blanks dropped.
    pub fn channel_list(&self) -> Vec<&str> {
        self.channels.split(',').map(str::trim).filter(|channel| !channel.is_empty()).collect()
    }

    /// Last path segment, ignoring trailing separators.
    pub fn filename(&self) -> &str {
        let path = self.trimmed_path();
        path.rsplit('/').next().unwrap_or(path)
    }

    /// Name of the directory containing the image.
    pub fn acquisition_folder(&self) -> &str {
        let mut segments = self.trimmed_path().rsplit('/');
        segments.next();
        segments.next().unwrap_or_default()
    }

    fn trimmed_path(&self) -> &str {
        self.path.trim_end_matches('/')
    }
}

/// An ordered collection of sample rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleTable {
    rows: Vec<SampleRow>,
}

impl SampleTable {
    pub fn new(rows: Vec<SampleRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[SampleRow] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SampleRow> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push(&mut self, row: SampleRow) {
        self.rows.push(row);
    }
}

impl FromIterator<SampleRow> for SampleTable {
    fn from_iter<T: IntoIterator<Item = SampleRow>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a SampleTable {
    type Item = &'a SampleRow;
    type IntoIter = std::slice::Iter<'a, SampleRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
