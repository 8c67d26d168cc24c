//! Normalized comparison of a generated LoadData CSV against a reference.
//!
//! Comparison ignores column order, row order, trailing `/` on `PathName_*` values and the
//! difference between `1` and `1.0`. Optionally the reference is first restricted to the wells the
//! generated table covers, so a partial run can be checked against a full reference.

use std::{collections::BTreeSet, fmt, fs::File, io::Read, path::Path};

use loaddata_types::{LoadDataTable, cell_text};
use thiserror::Error;

const WELL_COLUMN: &str = "Metadata_Well";
const PATH_PREFIX: &str = "PathName_";

#[derive(Debug, Error)]
pub enum CompareError {
    #[error("comparison I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("comparison CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// A CSV held as text cells, header first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.headers.len())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    /// Builds the text form a generated table would have on disk.
    pub fn from_load_data(table: &LoadDataTable, columns: &[String]) -> Self {
        let rows = table
            .rows
            .iter()
            .map(|row| columns.iter().map(|column| row.get(column).map(cell_text).unwrap_or_default()).collect())
            .collect();
        Self {
            headers: columns.to_vec(),
            rows,
        }
    }
}

/// Read a CSV file into a [`CsvTable`].
pub fn read_csv_table(path: impl AsRef<Path>) -> Result<CsvTable, CompareError> {
    parse_csv_table(File::open(path)?)
}

pub fn parse_csv_table<R: Read>(reader: R) -> Result<CsvTable, CompareError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let headers = csv_reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in csv_reader.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }
    Ok(CsvTable { headers, rows })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompareOptions {
    /// Drop reference rows whose `Metadata_Well` does not appear in the generated table.
    pub restrict_reference_wells: bool,
}

/// Outcome of a comparison, first failing check wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    Match {
        rows: usize,
        columns: usize,
    },
    ShapeMismatch {
        reference: (usize, usize),
        generated: (usize, usize),
    },
    ColumnMismatch {
        missing: Vec<String>,
        extra: Vec<String>,
    },
    ValueMismatch {
        differing_rows: usize,
        first_row: usize,
        column: String,
        reference: String,
        generated: String,
    },
}

impl Comparison {
    pub fn is_match(&self) -> bool {
        matches!(self, Comparison::Match { .. })
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::Match { rows, columns } => write!(f, "tables match ({rows} rows, {columns} columns)"),
            Comparison::ShapeMismatch { reference, generated } => write!(
                f,
                "shape mismatch: reference has {} rows x {} columns, generated has {} rows x {} columns",
                reference.0, reference.1, generated.0, generated.1
            ),
            Comparison::ColumnMismatch { missing, extra } => {
                write!(f, "column mismatch")?;
                if !missing.is_empty() {
                    write!(f, "; missing from generated: {}", missing.join(", "))?;
                }
                if !extra.is_empty() {
                    write!(f, "; extra in generated: {}", extra.join(", "))?;
                }
                Ok(())
            }
            Comparison::ValueMismatch {
                differing_rows,
                first_row,
                column,
                reference,
                generated,
            } => write!(
                f,
                "{differing_rows} sorted row(s) differ; first at row {first_row}, column {column}: reference '{reference}', generated '{generated}'"
            ),
        }
    }
}

/// Compare `generated` against `reference`.
pub fn compare_tables(reference: &CsvTable, generated: &CsvTable, options: CompareOptions) -> Comparison {
    let restricted;
    let reference = if options.restrict_reference_wells {
        restricted = restrict_to_wells(reference, generated);
        &restricted
    } else {
        reference
    };

    if reference.shape() != generated.shape() {
        return Comparison::ShapeMismatch {
            reference: reference.shape(),
            generated: generated.shape(),
        };
    }

    let reference_columns: BTreeSet<&str> = reference.headers.iter().map(String::as_str).collect();
    let generated_columns: BTreeSet<&str> = generated.headers.iter().map(String::as_str).collect();
    if reference_columns != generated_columns {
        return Comparison::ColumnMismatch {
            missing: reference_columns.difference(&generated_columns).map(|name| name.to_string()).collect(),
            extra: generated_columns.difference(&reference_columns).map(|name| name.to_string()).collect(),
        };
    }

    let columns: Vec<&str> = reference_columns.into_iter().collect();
    let expected = normalized_rows(reference, &columns);
    let actual = normalized_rows(generated, &columns);

    let mut differing = expected.iter().zip(&actual).enumerate().filter(|(_, (left, right))| left != right);
    let Some((first_row, (expected_row, actual_row))) = differing.next() else {
        return Comparison::Match {
            rows: generated.rows.len(),
            columns: columns.len(),
        };
    };
    let column_index = expected_row
        .iter()
        .zip(actual_row)
        .position(|(left, right)| left != right)
        .unwrap_or_default();

    Comparison::ValueMismatch {
        differing_rows: 1 + differing.count(),
        first_row: first_row + 1,
        column: columns[column_index].to_string(),
        reference: expected_row[column_index].clone(),
        generated: actual_row[column_index].clone(),
    }
}

fn restrict_to_wells(reference: &CsvTable, generated: &CsvTable) -> CsvTable {
    let (Some(reference_well), Some(generated_well)) = (reference.column_index(WELL_COLUMN), generated.column_index(WELL_COLUMN)) else {
        return reference.clone();
    };
    let wells: BTreeSet<&str> = generated.rows.iter().filter_map(|row| row.get(generated_well).map(String::as_str)).collect();
    CsvTable {
        headers: reference.headers.clone(),
        rows: reference
            .rows
            .iter()
            .filter(|row| row.get(reference_well).is_some_and(|well| wells.contains(well.as_str())))
            .cloned()
            .collect(),
    }
}

/// Rows projected onto `columns` (sorted names), normalized, then sorted.
fn normalized_rows(table: &CsvTable, columns: &[&str]) -> Vec<Vec<String>> {
    let positions: Vec<Option<usize>> = columns.iter().map(|column| table.column_index(column)).collect();
    let mut rows: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .zip(&positions)
                .map(|(column, position)| {
                    let raw = position.and_then(|index| row.get(index)).map(String::as_str).unwrap_or_default();
                    normalize_cell(column, raw)
                })
                .collect()
        })
        .collect();
    rows.sort();
    rows
}

fn normalize_cell(column: &str, raw: &str) -> String {
    let value = raw.trim();
    let value = if column.starts_with(PATH_PREFIX) { value.trim_end_matches('/') } else { value };
    if let Ok(float) = value.parse::<f64>()
        && float.is_finite()
        && float.fract() == 0.0
        && float.abs() < 1e15
        && value.contains('.')
    {
        return format!("{}", float as i64);
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(csv: &str) -> CsvTable {
        parse_csv_table(csv.as_bytes()).unwrap()
    }

    #[test]
    fn ignores_order_slashes_and_float_formatting() {
        let reference = table("Metadata_Well,PathName_OrigDNA,Frame_OrigDNA\nA2,/data/x/,1.0\nA1,/data/y,0\n");
        let generated = table("Frame_OrigDNA,Metadata_Well,PathName_OrigDNA\n0,A1,/data/y\n1,A2,/data/x\n");
        let outcome = compare_tables(&reference, &generated, CompareOptions::default());
        assert_eq!(outcome, Comparison::Match { rows: 2, columns: 3 });
        assert!(outcome.is_match());
    }

    #[test]
    fn reports_shape_before_columns() {
        let reference = table("Metadata_Well,X\nA1,1\nA2,2\n");
        let generated = table("Metadata_Well,Y\nA1,1\n");
        assert_eq!(
            compare_tables(&reference, &generated, CompareOptions::default()),
            Comparison::ShapeMismatch {
                reference: (2, 2),
                generated: (1, 2)
            }
        );
    }

    #[test]
    fn reports_missing_and_extra_columns() {
        let reference = table("Metadata_Well,FileName_OrigDNA\nA1,a.tiff\n");
        let generated = table("Metadata_Well,FileName_DNA\nA1,a.tiff\n");
        let outcome = compare_tables(&reference, &generated, CompareOptions::default());
        assert_eq!(
            outcome,
            Comparison::ColumnMismatch {
                missing: vec!["FileName_OrigDNA".into()],
                extra: vec!["FileName_DNA".into()],
            }
        );
        assert_eq!(outcome.to_string(), "column mismatch; missing from generated: FileName_OrigDNA; extra in generated: FileName_DNA");
    }

    #[test]
    fn reports_first_differing_value() {
        let reference = table("Metadata_Well,FileName_OrigDNA\nA1,a.tiff\nA2,b.tiff\n");
        let generated = table("Metadata_Well,FileName_OrigDNA\nA1,a.tiff\nA2,c.tiff\n");
        let outcome = compare_tables(&reference, &generated, CompareOptions::default());
        assert_eq!(
            outcome,
            Comparison::ValueMismatch {
                differing_rows: 1,
                first_row: 2,
                column: "FileName_OrigDNA".into(),
                reference: "b.tiff".into(),
                generated: "c.tiff".into(),
            }
        );
    }

    #[test]
    fn restricts_reference_to_generated_wells() {
        let reference = table("Metadata_Well,Frame_OrigDNA\nA1,0\nB7,0\nA2,0\n");
        let generated = table("Metadata_Well,Frame_OrigDNA\nA2,0\nA1,0\n");

        assert!(!compare_tables(&reference, &generated, CompareOptions::default()).is_match());
        let restricted = CompareOptions {
            restrict_reference_wells: true,
        };
        assert!(compare_tables(&reference, &generated, restricted).is_match());
    }

    #[test]
    fn generated_table_text_matches_written_form() {
        let mut row = loaddata_types::LoadDataRow::new();
        row.insert("Metadata_Well".into(), serde_json::json!("A1"));
        row.insert("Frame_OrigDNA".into(), serde_json::json!(2));
        let generated = LoadDataTable::new("1", vec![row]);
        let columns = vec!["Metadata_Well".to_string(), "Frame_OrigDNA".to_string(), "Absent".to_string()];

        let csv_table = CsvTable::from_load_data(&generated, &columns);
        assert_eq!(csv_table.rows, vec![vec!["A1".to_string(), "2".to_string(), String::new()]]);
    }
}
