use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use loaddata_engine::{Generator, Specification, load_specification_file};
use loaddata_types::{LoadDataTable, RowLayout, SampleTable};
use loaddata_util::{
    CompareOptions, CsvTable, OutputLayout, compare_tables, presentation_columns, read_csv_table, read_samplesheet, reference_path,
    resolve_base_path, write_load_data_csv,
};
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "loaddata", version, about = "Predict pipeline LoadData CSVs from a samplesheet")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate LoadData tables for every (or the selected) pipeline
    Generate(GenerateArgs),
    /// Load a specification and report its contents and diagnostics
    Validate {
        /// Specification file (.json, otherwise YAML)
        spec: PathBuf,
    },
    /// Compare a generated LoadData CSV against a reference
    Compare(CompareArgs),
}

#[derive(Debug, Args)]
struct GenerateArgs {
    /// Samplesheet CSV
    samplesheet: PathBuf,
    /// Specification file (.json, otherwise YAML)
    spec: PathBuf,
    /// Write CSVs under this directory; without it only a summary is printed
    #[arg(long, short = 'o')]
    output_dir: Option<PathBuf>,
    /// Only generate these pipelines (repeatable)
    #[arg(long = "pipeline", short = 'p', value_name = "ID")]
    pipelines: Vec<String>,
    /// Skip these pipelines (repeatable)
    #[arg(long = "skip", value_name = "ID")]
    skip: Vec<String>,
    /// Root of the image tree; overrides LOADDATA_BASE_PATH and the specification
    #[arg(long)]
    base_path: Option<String>,
    /// Output path template relative to the output directory
    #[arg(long, value_name = "TEMPLATE")]
    layout: Option<String>,
    /// Compare each written table with its sibling `_revised.csv`
    #[arg(long)]
    validate: bool,
}

#[derive(Debug, Args)]
struct CompareArgs {
    reference: PathBuf,
    generated: PathBuf,
    /// Only keep reference rows for wells present in the generated table
    #[arg(long)]
    restrict_wells: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::Validate { spec } => run_validate(spec),
        Command::Compare(args) => run_compare(args),
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_generate(args: GenerateArgs) -> Result<()> {
    let specification = load_specification_file(&args.spec)?;
    let samples = read_samplesheet(&args.samplesheet).with_context(|| format!("Failed to read samplesheet: {}", args.samplesheet.display()))?;
    let base_path = resolve_base_path(args.base_path.as_deref(), &specification.metadata().base_path);
    info!(samples = samples.len(), base_path = %base_path, "loaded inputs");

    let layout = args.output_dir.as_ref().map(|root| OutputLayout::new(root, args.layout.as_deref()));
    if let Some(layout) = &layout {
        let unresolved = layout.unresolved();
        if !unresolved.is_empty() {
            warn!(template = layout.template(), unresolved = ?unresolved, "output layout has placeholders that will not be expanded");
        }
    }

    let pipeline_ids: Vec<String> = if args.pipelines.is_empty() {
        specification.pipeline_ids().map(str::to_string).collect()
    } else {
        args.pipelines.clone()
    };
    let pipeline_ids: Vec<String> = pipeline_ids.into_iter().filter(|id| !args.skip.contains(id)).collect();

    let generator = Generator::new(&specification);
    let mut summaries = Vec::new();
    let mut failures = Vec::new();

    for pipeline_id in &pipeline_ids {
        let table = match generator.generate(pipeline_id, &samples, Some(&base_path)) {
            Ok(table) => table,
            Err(err) => {
                error!(pipeline = %pipeline_id, error = %err, "pipeline generation failed");
                failures.push(pipeline_id.clone());
                continue;
            }
        };

        let cycle_aware = specification
            .get_pipeline(pipeline_id)
            .is_ok_and(|pipeline| pipeline.layout() == RowLayout::WideFormat);
        let columns = presentation_columns(&table, cycle_aware);
        summaries.push(serde_json::json!({
            "pipeline": pipeline_id,
            "rows": table.len(),
            "columns": columns.len(),
        }));

        let Some(layout) = &layout else {
            continue;
        };
        if table.is_empty() {
            warn!(pipeline = %pipeline_id, "no rows generated; nothing written");
            continue;
        }
        match write_and_check(layout, &samples, &table, &columns, args.validate) {
            Ok(true) => {}
            Ok(false) => failures.push(pipeline_id.clone()),
            Err(err) => {
                error!(pipeline = %pipeline_id, error = %format!("{err:#}"), "failed to write LoadData table");
                failures.push(pipeline_id.clone());
            }
        }
    }

    if layout.is_none() {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    }

    if !failures.is_empty() {
        bail!("{} of {} pipelines failed: {}", failures.len(), pipeline_ids.len(), failures.join(", "));
    }
    Ok(())
}

/// Writes one table and, when asked, checks it against the reference next to it.
/// Returns `false` when a reference exists and differs.
fn write_and_check(layout: &OutputLayout, samples: &SampleTable, table: &LoadDataTable, columns: &[String], validate: bool) -> Result<bool> {
    let path = layout.table_path(&table.pipeline_id, samples);
    write_load_data_csv(&path, table, columns)?;
    info!(pipeline = %table.pipeline_id, path = %path.display(), rows = table.len(), columns = columns.len(), "wrote LoadData CSV");

    if !validate {
        return Ok(true);
    }
    let reference = reference_path(&path, &table.pipeline_id);
    if !reference.exists() {
        warn!(pipeline = %table.pipeline_id, reference = %reference.display(), "no reference table to validate against");
        return Ok(true);
    }

    let expected = read_csv_table(&reference).with_context(|| format!("Failed to read reference: {}", reference.display()))?;
    let generated = CsvTable::from_load_data(table, columns);
    let outcome = compare_tables(&expected, &generated, CompareOptions::default());
    if outcome.is_match() {
        info!(pipeline = %table.pipeline_id, "{outcome}");
    } else {
        error!(pipeline = %table.pipeline_id, reference = %reference.display(), "{outcome}");
    }
    Ok(outcome.is_match())
}

fn run_validate(spec: PathBuf) -> Result<()> {
    let specification = load_specification_file(&spec)?;
    print_specification(&specification);
    Ok(())
}

fn print_specification(specification: &Specification) {
    let document = specification.document();
    println!("{} (version {})", document.metadata.description, document.metadata.version);
    println!("base path: {}", document.metadata.base_path);

    println!("pipelines:");
    for (pipeline_id, pipeline) in &document.pipelines {
        println!("  {pipeline_id}: {} [{}]", pipeline.name, pipeline.layout());
        if let Ok(filter) = specification.row_filter(pipeline_id) {
            println!("    filter: {}", filter.source().unwrap_or("(all rows)"));
        }
    }
    println!("channel sets:");
    for (name, channels) in &document.channel_definitions {
        println!("  {name}: {}", channels.join(", "));
    }
    if !document.special_values.is_empty() {
        println!("special values:");
        for (name, meaning) in &document.special_values {
            println!("  {name}: {meaning}");
        }
    }

    let diagnostics = specification.diagnostics();
    if diagnostics.is_empty() {
        println!("no diagnostics");
    } else {
        println!("diagnostics:");
        for finding in diagnostics {
            println!("  - {finding}");
        }
    }
}

fn run_compare(args: CompareArgs) -> Result<()> {
    let reference = read_csv_table(&args.reference).with_context(|| format!("Failed to read reference: {}", args.reference.display()))?;
    let generated = read_csv_table(&args.generated).with_context(|| format!("Failed to read generated table: {}", args.generated.display()))?;
    let options = CompareOptions {
        restrict_reference_wells: args.restrict_wells,
    };

    let outcome = compare_tables(&reference, &generated, options);
    println!("{outcome}");
    if !outcome.is_match() {
        bail!("{} differs from {}", args.generated.display(), args.reference.display());
    }
    Ok(())
}
