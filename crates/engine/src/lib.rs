//! # LoadData Engine
//!
//! Predicts the LoadData tables an image-processing pipeline expects, from a samplesheet of
//! acquisition metadata and a declarative specification. Nothing on disk is inspected: every path
//! and file name is synthesised from the specification's column rules.
//!
//! ## Usage
//!
//! ```rust
//! use loaddata_engine::{Generator, Specification};
//! use loaddata_types::{SampleRow, SampleTable};
//!
//! let specification = Specification::from_yaml_str(r#"
//! metadata: {description: demo, version: "1", base_path: /data}
//! channel_definitions:
//!   painting: [DNA, Phalloidin]
//! pipelines:
//!   "1":
//!     name: illumination
//!     filter: "arm == 'painting'"
//!     grouping: [plate]
//!     columns:
//!       metadata:
//!         - {name: Metadata_Plate, source: plate}
//!       per_channel:
//!         channels: painting
//!         columns:
//!           - {name: "FileName_Orig{channel}", pattern: "{filename}"}
//!           - {name: "Frame_Orig{channel}", value: channel_index}
//! "#)?;
//!
//! let samples = SampleTable::new(vec![SampleRow {
//!     path: "/images/Plate1/20X_CP/WellA1_Site0.ome.tiff".into(),
//!     arm: "painting".into(),
//!     batch: "Batch1".into(),
//!     plate: "Plate1".into(),
//!     well: "A1".into(),
//!     channels: "Phalloidin,DNA".into(),
//!     site: 0,
//!     cycle: 1,
//!     n_frames: 2,
//!     extra: Default::default(),
//! }]);
//!
//! let table = Generator::new(&specification).generate("1", &samples, None)?;
//! assert_eq!(table.rows[0]["Frame_OrigDNA"], 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`specification`**: loading, validation, lookups, and diagnostics
//! - **`templates`**: `{var}` / `{var:02d}` expansion
//! - **`channels`**: per-row frame index resolution
//! - **`expression`** and **`filter`**: the allow-listed formula language
//! - **`resolve`**: cell value resolution
//! - **`strategy`**: standard, wide-format, and synthetic-tile row layouts
//! - **`generator`**: the orchestrator tying them together

use std::path::Path;

use anyhow::{Context, Result};

pub mod channels;
pub mod expression;
pub mod filter;
pub mod generator;
pub mod resolve;
pub mod scope;
pub mod specification;
pub mod strategy;
pub mod templates;

pub use channels::ChannelOrder;
pub use expression::{CompiledExpression, ExprValue, ExpressionError};
pub use filter::RowFilter;
pub use generator::{GenerateError, Generator};
pub use resolve::{resolve_column, resolve_column_value};
pub use scope::VariableScope;
pub use specification::{SpecError, Specification};
pub use strategy::{GenerationContext, RowStrategy, strategy_for};
pub use templates::expand;

/// Loads a specification file, attaching the path to any failure.
pub fn load_specification_file(file_path: impl AsRef<Path>) -> Result<Specification> {
    let file_path = file_path.as_ref();
    Specification::load(file_path).with_context(|| format!("Failed to load specification: {}", file_path.display()))
}
