//! Shared data model for LoadData generation: the specification document, sample rows, and
//! generated tables.

pub mod sample;
pub mod specification;
pub mod table;

pub use sample::{SAMPLE_FIELDS, SampleRow, SampleTable};
pub use specification::validation::validate_document;
pub use specification::*;
pub use table::{LoadDataRow, LoadDataTable, cell_text};
