//! LoadData CSV output and column presentation order.

use std::{cmp::Ordering, fs, path::Path};

use anyhow::{Context, Result};
use loaddata_types::{LoadDataTable, cell_text};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static CYCLE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"Cycle(\d+)").expect("valid cycle regex"));

const COLUMN_FAMILIES: [&str; 3] = ["Metadata_", "PathName_", "FileName_"];
const FRAME_FAMILY: &str = "Frame_";

/// Orders a table's columns for output.
///
/// Columns are grouped as `Metadata_*`, `PathName_*`, `FileName_*`, `Frame_*`, then everything
/// else. Within a group, first-seen order is kept unless `cycle_aware` is set, in which case the
/// path, file and frame groups are sorted by cycle number, `Orig` columns first, then name.
pub fn presentation_columns(table: &LoadDataTable, cycle_aware: bool) -> Vec<String> {
    let columns = table.columns();
    let mut groups: Vec<Vec<String>> = vec![Vec::new(); COLUMN_FAMILIES.len() + 2];

    for column in columns {
        let slot = COLUMN_FAMILIES
            .iter()
            .position(|prefix| column.starts_with(prefix))
            .or_else(|| column.starts_with(FRAME_FAMILY).then_some(COLUMN_FAMILIES.len()))
            .unwrap_or(COLUMN_FAMILIES.len() + 1);
        groups[slot].push(column);
    }

    if cycle_aware {
        for group in &mut groups[1..=COLUMN_FAMILIES.len()] {
            group.sort_by(|left, right| compare_cycle_columns(left, right));
        }
    }

    groups.into_iter().flatten().collect()
}

fn cycle_sort_key(column: &str) -> (i64, u8) {
    let cycle = CYCLE_NUMBER
        .captures(column)
        .and_then(|captures| captures[1].parse().ok())
        .unwrap_or(0);
    let original_first = if column.contains("Orig") { 0 } else { 1 };
    (cycle, original_first)
}

fn compare_cycle_columns(left: &str, right: &str) -> Ordering {
    cycle_sort_key(left).cmp(&cycle_sort_key(right)).then_with(|| left.cmp(right))
}

/// Writes `table` as CSV with the given column order, creating parent directories as needed.
///
/// Cells absent from a row are written empty.
pub fn write_load_data_csv(path: impl AsRef<Path>, table: &LoadDataTable, columns: &[String]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }

    let mut writer = csv::Writer::from_path(path).with_context(|| format!("Failed to create LoadData CSV: {}", path.display()))?;
    writer.write_record(columns)?;
    for row in &table.rows {
        let record: Vec<String> = columns
            .iter()
            .map(|column| row.get(column).map(cell_text).unwrap_or_default())
            .collect();
        writer.write_record(&record)?;
    }
    writer.flush().with_context(|| format!("Failed to write LoadData CSV: {}", path.display()))?;

    debug!(path = %path.display(), rows = table.len(), columns = columns.len(), "wrote LoadData CSV");
    Ok(())
}
