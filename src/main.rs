use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use field_mapper_rs::{
    DatasetRegistry, PassSurveyPipeline, PipelineConfig, PipelineEvent, PipelineRun, SurveyDefinition,
    TableScanPipeline, TrajectoryMapPipeline,
};

#[derive(Parser, Debug)]
#[command(name = "field_mapper")]
#[command(about = "Reconstruct located magnetic field maps from sensor logs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON file overriding any subset of the pipeline defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write the full result as JSON instead of printing a summary
    #[arg(long, global = true)]
    output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dead-reckon a handheld trajectory and attach field magnitude
    Trajectory(TrajectoryArgs),
    /// Build a pass matrix from several parallel passes of known length
    Survey(SurveyArgs),
    /// Grid a fixed-rig ultrasonic table scan
    Table(TableArgs),
}

#[derive(Args, Debug)]
struct TrajectoryArgs {
    /// Linear acceleration export (.csv or .csv.gz)
    #[arg(long, default_value = "Linear Acceleration.csv")]
    accel: PathBuf,

    /// Magnetometer export; the trajectory is still produced without it
    #[arg(long)]
    mag: Option<PathBuf>,

    /// Also remove linear drift from position
    #[arg(long, default_value_t = false)]
    detrend_position: bool,
}

#[derive(Args, Debug)]
struct SurveyArgs {
    /// Survey definition JSON listing the passes
    definition: PathBuf,
}

#[derive(Args, Debug)]
struct TableArgs {
    /// Dataset id from the registry
    #[arg(long)]
    dataset: String,

    /// Registry JSON (defaults to the built-in table datasets)
    #[arg(long)]
    registry: Option<PathBuf>,

    /// Directory holding the dataset files
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_path(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Command::Trajectory(args) => {
            if args.detrend_position {
                config.trajectory.detrend_position = true;
            }
            let run = TrajectoryMapPipeline::new(config).run(&args.accel, args.mag.as_deref())?;
            let end = run.output.trajectory.last();
            println!(
                "Trajectory: {} points, dt={:.5}s, end={}",
                run.output.trajectory.len(),
                run.output.dt,
                end.map(|p| format!("({:.3}, {:.3}) m", p.x, p.y))
                    .unwrap_or_else(|| "-".to_string())
            );
            if let Some(field) = &run.output.field {
                let (lo, hi) = min_max(field);
                println!("Field: {lo:.2} .. {hi:.2} µT");
            }
            finish(&run, cli.output.as_deref())
        }
        Command::Survey(args) => {
            let survey = SurveyDefinition::from_path(&args.definition)
                .with_context(|| format!("reading survey {}", args.definition.display()))?;
            if survey.passes.is_empty() {
                bail!("survey {} lists no passes", args.definition.display());
            }
            let run = PassSurveyPipeline::new(config).run(&survey)?;
            println!(
                "Pass matrix: {} passes x {} points, {} field samples",
                run.output.matrix.passes(),
                run.output.matrix.points(),
                run.output.samples.len()
            );
            finish(&run, cli.output.as_deref())
        }
        Command::Table(args) => {
            let registry = match &args.registry {
                Some(path) => DatasetRegistry::from_path(path)?,
                None => DatasetRegistry::default(),
            }
            .with_base_dir(&args.data_dir);
            let Some(entry) = registry.get(&args.dataset) else {
                bail!(
                    "unknown dataset {:?} (available: {})",
                    args.dataset,
                    registry.ids().join(", ")
                );
            };
            let run = TableScanPipeline::new(config).run(entry)?;
            let grid = &run.output.grid;
            println!(
                "{}: {} samples, {}x{} grid, {} cells defined",
                run.output.display_name,
                run.output.samples.len(),
                grid.xs.len(),
                grid.ys.len(),
                grid.defined_count()
            );
            finish(&run, cli.output.as_deref())
        }
    }
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

fn finish<T: Serialize>(run: &PipelineRun<T>, output: Option<&Path>) -> Result<()> {
    for event in &run.events {
        println!("  ! {}", describe(event));
    }
    if let Some(path) = output {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, run)?;
        println!("Saved {}", path.display());
    }
    Ok(())
}

fn describe(event: &PipelineEvent) -> String {
    match event {
        PipelineEvent::DtFallback { stage, nominal_dt } => format!("{stage}: unusable clock, dt={nominal_dt}s assumed"),
        PipelineEvent::ForcedLengthScaled { pass, factor, flipped } => {
            format!("pass {}: scaled by {factor:.3}{}", pass + 1, if *flipped { " (reversed)" } else { "" })
        }
        PipelineEvent::ForcedLengthRamp { pass, raw_final } => {
            format!("pass {}: raw travel {raw_final:.4} m too small, linear ramp used", pass + 1)
        }
        PipelineEvent::RowsUnmatched { stage, count } => format!("{stage}: {count} rows without a match"),
        PipelineEvent::RowsDropped { stage, count } => format!("{stage}: {count} incomplete rows dropped"),
        PipelineEvent::SparseSmoothing { n_points } => {
            format!("sparse data ({n_points} points), reduced smoothing")
        }
        PipelineEvent::ResamplePassThrough { pass, len } => {
            format!("pass {}: only {len} samples, left out of the matrix", pass + 1)
        }
        PipelineEvent::MagnetometerMissing { reason } => format!("no field values: {reason}"),
        PipelineEvent::PassSkipped { pass, reason } => format!("pass {} skipped: {reason}", pass + 1),
        PipelineEvent::ArtifactRowsFiltered { count, threshold } => {
            format!("{count} rows with S1 <= {threshold} removed")
        }
        PipelineEvent::LinesSkipped { count } => format!("{count} log lines could not be parsed"),
        PipelineEvent::DuplicatePointsIgnored { count } => format!("{count} samples at repeated positions ignored"),
        PipelineEvent::NonFiniteSamplesIgnored { count } => format!("{count} samples with NaN or infinite values ignored"),
        PipelineEvent::DegenerateTriangulation { samples } => {
            format!("{samples} samples do not span an area, grid is empty")
        }
    }
}
