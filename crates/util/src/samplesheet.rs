//! Samplesheet CSV reading.
//!
//! A samplesheet has one row per acquired image. Columns beyond the built-in sample fields are
//! kept verbatim so specifications can reference them through `source` or expressions.

use std::{fs::File, io::Read, path::Path};

use indexmap::IndexMap;
use loaddata_types::{SAMPLE_FIELDS, SampleRow, SampleTable};
use thiserror::Error;
use tracing::debug;

/// Columns every samplesheet must provide.
pub const REQUIRED_COLUMNS: [&str; 6] = ["path", "arm", "plate", "well", "channels", "site"];

/// Errors surfaced while reading a samplesheet.
#[derive(Debug, Error)]
pub enum SamplesheetError {
    /// The file could not be opened or read.
    #[error("samplesheet I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed CSV (for example, a row with the wrong number of fields).
    #[error("samplesheet CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("samplesheet is missing required column '{0}'")]
    MissingColumn(String),
    #[error("samplesheet row {row}: column '{column}' holds '{value}', expected an integer")]
    InvalidInteger { row: usize, column: String, value: String },
}

/// Read the samplesheet at `path`.
pub fn read_samplesheet(path: impl AsRef<Path>) -> Result<SampleTable, SamplesheetError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let table = parse_samplesheet(file)?;
    debug!(path = %path.display(), rows = table.len(), "read samplesheet");
    Ok(table)
}

/// Parse samplesheet CSV from any reader. Row numbers in errors count data rows from 1.
pub fn parse_samplesheet<R: Read>(reader: R) -> Result<SampleTable, SamplesheetError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let headers: Vec<String> = csv_reader.headers()?.iter().map(|header| header.trim().to_string()).collect();

    for required in REQUIRED_COLUMNS {
        if !headers.iter().any(|header| header == required) {
            return Err(SamplesheetError::MissingColumn(required.to_string()));
        }
    }

    let mut table = SampleTable::default();
    for (index, record) in csv_reader.records().enumerate() {
        let record = record?;
        let mut cells: IndexMap<&str, &str> = IndexMap::with_capacity(headers.len());
        for (header, field) in headers.iter().zip(record.iter()) {
            cells.insert(header.as_str(), field);
        }
        table.push(sample_from_cells(index + 1, &cells)?);
    }
    Ok(table)
}

fn sample_from_cells(row: usize, cells: &IndexMap<&str, &str>) -> Result<SampleRow, SamplesheetError> {
    let text = |column: &str| cells.get(column).map(|value| value.trim().to_string()).unwrap_or_default();
    let integer = |column: &str| -> Result<Option<i64>, SamplesheetError> {
        let raw = text(column);
        if raw.is_empty() {
            return Ok(None);
        }
        parse_integer(&raw).map(Some).ok_or_else(|| SamplesheetError::InvalidInteger {
            row,
            column: column.to_string(),
            value: raw.clone(),
        })
    };

    let site = integer("site")?.ok_or_else(|| SamplesheetError::InvalidInteger {
        row,
        column: "site".to_string(),
        value: String::new(),
    })?;
    let channels = text("channels");
    let channel_count = channels.split(',').filter(|channel| !channel.trim().is_empty()).count() as i64;

    let extra = cells
        .iter()
        .filter(|(column, _)| !SAMPLE_FIELDS.contains(column))
        .map(|(column, value)| (column.to_string(), value.to_string()))
        .collect();

    Ok(SampleRow {
        path: text("path"),
        arm: text("arm"),
        batch: text("batch"),
        plate: text("plate"),
        well: text("well"),
        site,
        cycle: integer("cycle")?.unwrap_or(1),
        n_frames: integer("n_frames")?.unwrap_or(channel_count),
        channels,
        extra,
    })
}

/// Accepts `3` and spreadsheet-style `3.0`.
fn parse_integer(raw: &str) -> Option<i64> {
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }
    let float = raw.parse::<f64>().ok()?;
    (float.is_finite() && float.fract() == 0.0 && float.abs() < 9.0e15).then_some(float as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const SAMPLESHEET: &str = "\
path,arm,batch,plate,well,channels,site,cycle,n_frames
/images/Plate1/20X_CP/WellA1_Point_0000.ome.tiff,painting,Batch1,Plate1,A1,\"Phalloidin,CHN2,DNA\",0,1,3
/images/Plate1/20X_c2_SBS-2/WellA1_Point_0001.ome.tiff,barcoding,Batch1,Plate1,A1,\"C,A,T,G,DNA\",1.0,2,5
";

    #[test]
    fn reads_all_fields() {
        let table = parse_samplesheet(SAMPLESHEET.as_bytes()).unwrap();
        assert_eq!(table.len(), 2);

        let painting = &table.rows()[0];
        assert_eq!(painting.arm, "painting");
        assert_eq!(painting.channels, "Phalloidin,CHN2,DNA");
        assert_eq!(painting.n_frames, 3);

        let barcoding = &table.rows()[1];
        assert_eq!(barcoding.site, 1);
        assert_eq!(barcoding.cycle, 2);
        assert!(barcoding.extra.is_empty());
    }

    #[test]
    fn optional_columns_take_defaults_and_extras_are_kept() {
        let csv = "path,arm,plate,well,channels,site,magnification\n/a/b.tiff,painting,P1,B2,\"DNA,CHN2\",4,20X\n";
        let table = parse_samplesheet(csv.as_bytes()).unwrap();
        let sample = &table.rows()[0];
        assert_eq!(sample.batch, "");
        assert_eq!(sample.cycle, 1);
        assert_eq!(sample.n_frames, 2);
        assert_eq!(sample.extra.get("magnification").map(String::as_str), Some("20X"));
    }

    #[test]
    fn missing_required_column_is_reported() {
        let csv = "path,arm,plate,well,site\n/a.tiff,painting,P1,A1,0\n";
        let error = parse_samplesheet(csv.as_bytes()).unwrap_err();
        assert!(matches!(error, SamplesheetError::MissingColumn(ref column) if column == "channels"), "{error}");
    }

    #[test]
    fn invalid_integer_names_row_and_column() {
        let csv = "path,arm,plate,well,channels,site,cycle\n/a.tiff,painting,P1,A1,DNA,0,1\n/b.tiff,painting,P1,A1,DNA,1,two\n";
        let error = parse_samplesheet(csv.as_bytes()).unwrap_err();
        assert_eq!(error.to_string(), "samplesheet row 2: column 'cycle' holds 'two', expected an integer");
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("samplesheet.csv");
        fs::write(&path, SAMPLESHEET).unwrap();
        assert_eq!(read_samplesheet(&path).unwrap().len(), 2);
        assert!(matches!(read_samplesheet(dir.path().join("absent.csv")), Err(SamplesheetError::Io(_))));
    }

    #[test]
    fn integer_parsing_accepts_whole_floats_only() {
        assert_eq!(parse_integer("3"), Some(3));
        assert_eq!(parse_integer("3.0"), Some(3));
        assert_eq!(parse_integer("3.5"), None);
        assert_eq!(parse_integer("x"), None);
    }
}
