//! File-facing helpers around the LoadData engine: samplesheet input, CSV output, reference
//! comparison and runtime configuration.

pub mod compare;
pub mod config;
pub mod samplesheet;
pub mod writer;

pub use compare::{CompareError, CompareOptions, Comparison, CsvTable, compare_tables, parse_csv_table, read_csv_table};
pub use config::{BASE_PATH_ENV, DEFAULT_OUTPUT_LAYOUT, OutputLayout, expand_tilde, reference_path, resolve_base_path};
pub use samplesheet::{REQUIRED_COLUMNS, SamplesheetError, parse_samplesheet, read_samplesheet};
pub use writer::{presentation_columns, write_load_data_csv};
