//! Runtime configuration: base path precedence and output file layout.

use std::{
    env,
    path::{Path, PathBuf},
};

use dirs_next::home_dir;
use loaddata_engine::{VariableScope, expand, templates::unresolved_placeholders};
use loaddata_types::SampleTable;

/// Environment variable overriding the specification's `metadata.base_path`.
pub const BASE_PATH_ENV: &str = "LOADDATA_BASE_PATH";

/// Output path template, relative to the output directory.
pub const DEFAULT_OUTPUT_LAYOUT: &str = "{batch}/{plate}_trimmed/load_data_pipeline{pipeline}_generated.csv";

const FALLBACK_BATCH: &str = "Batch1";
const FALLBACK_PLATE: &str = "Plate1";

/// Picks the base path: explicit flag, then [`BASE_PATH_ENV`], then the specification default.
///
/// Blank values are ignored at every level.
pub fn resolve_base_path(flag: Option<&str>, specification_default: &str) -> String {
    if let Some(flag) = flag.map(str::trim).filter(|value| !value.is_empty()) {
        return flag.to_string();
    }
    if let Ok(value) = env::var(BASE_PATH_ENV)
        && !value.trim().is_empty()
    {
        return value.trim().to_string();
    }
    specification_default.to_string()
}

/// Expands a leading `~` to the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let trimmed = path.trim();
    let home = || home_dir().unwrap_or_else(|| PathBuf::from("~"));
    if trimmed == "~" {
        return home();
    }
    match trimmed.strip_prefix("~/").or_else(|| trimmed.strip_prefix("~\\")) {
        Some(rest) => home().join(rest),
        None => PathBuf::from(trimmed),
    }
}

/// Where generated tables land under an output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
    template: String,
}

impl OutputLayout {
    pub fn new(root: impl AsRef<Path>, template: Option<&str>) -> Self {
        let root = expand_tilde(&root.as_ref().to_string_lossy());
        Self {
            root,
            template: template.unwrap_or(DEFAULT_OUTPUT_LAYOUT).to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Placeholders in the template that [`Self::table_path`] cannot fill.
    pub fn unresolved(&self) -> Vec<String> {
        unresolved_placeholders(&self.template, &layout_scope("", "", ""))
    }

    /// Output path of `pipeline_id`, with batch and plate taken from the first sample row.
    pub fn table_path(&self, pipeline_id: &str, samples: &SampleTable) -> PathBuf {
        let first = samples.iter().next();
        let batch = first.map(|sample| sample.batch.as_str()).filter(|batch| !batch.is_empty()).unwrap_or(FALLBACK_BATCH);
        let plate = first.map(|sample| sample.plate.as_str()).filter(|plate| !plate.is_empty()).unwrap_or(FALLBACK_PLATE);
        self.root.join(expand(&self.template, &layout_scope(batch, plate, pipeline_id)))
    }
}

fn layout_scope(batch: &str, plate: &str, pipeline_id: &str) -> VariableScope {
    let mut scope = VariableScope::new();
    scope.insert("batch", batch);
    scope.insert("plate", plate);
    scope.insert("pipeline", pipeline_id);
    scope
}

/// The hand-curated reference table expected next to a generated one.
pub fn reference_path(generated: &Path, pipeline_id: &str) -> PathBuf {
    generated.with_file_name(format!("load_data_pipeline{pipeline_id}_revised.csv"))
}
