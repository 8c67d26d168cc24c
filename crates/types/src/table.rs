//! Generated LoadData rows and tables.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One output row: column name to cell value. Absent keys are intentionally absent cells.
pub type LoadDataRow = IndexMap<String, Value>;

/// The rows generated for one pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadDataTable {
    pub pipeline_id: String,
    pub rows: Vec<LoadDataRow>,
}

impl LoadDataTable {
    pub fn new(pipeline_id: impl Into<String>, rows: Vec<LoadDataRow>) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            rows,
        }
    }

    /// Union of row keys in first-seen order.
    pub fn columns(&self) -> Vec<String> {
        let mut seen = IndexSet::new();
        for row in &self.rows {
            for key in row.keys() {
                if !seen.contains(key) {
                    seen.insert(key.clone());
                }
            }
        }
        seen.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Render a cell value as CSV text.
///
/// Strings are written without quotes, integral floats drop their fraction, booleans render as
/// `True`/`False` and null renders empty.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(number) => {
            if let Some(integer) = number.as_i64() {
                integer.to_string()
            } else if let Some(float) = number.as_f64()
                && float.fract() == 0.0
                && float.abs() < 1e15
            {
                format!("{}", float as i64)
            } else {
                number.to_string()
            }
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn columns_follow_first_seen_order() {
        let first: LoadDataRow = IndexMap::from([("Metadata_Plate".to_string(), json!("P1")), ("FileName_OrigDNA".to_string(), json!("a.tiff"))]);
        let second: LoadDataRow = IndexMap::from([("Metadata_Plate".to_string(), json!("P1")), ("Frame_OrigDNA".to_string(), json!(2))]);
        let table = LoadDataTable::new("1", vec![first, second]);
        assert_eq!(table.columns(), vec!["Metadata_Plate", "FileName_OrigDNA", "Frame_OrigDNA"]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn empty_table_has_no_columns() {
        let table = LoadDataTable::new("4", Vec::new());
        assert!(table.is_empty());
        assert!(table.columns().is_empty());
    }

    #[test]
    fn cell_text_renders_scalars() {
        assert_eq!(cell_text(&json!("A1")), "A1");
        assert_eq!(cell_text(&json!(3)), "3");
        assert_eq!(cell_text(&json!(3.0)), "3");
        assert_eq!(cell_text(&json!(2.5)), "2.5");
        assert_eq!(cell_text(&json!(true)), "True");
        assert_eq!(cell_text(&json!(false)), "False");
        assert_eq!(cell_text(&Value::Null), "");
    }
}
