//! folio-bench: CLI tool for running pipeline recipes and collecting
//! diagnostics.
//!
//! Runs a recipe over an image file, printing which nodes computed and
//! how long each took. Useful for:
//!
//! - Trying stage orders and parameters on real scans
//! - Measuring per-filter durations to identify bottlenecks
//! - Exporting a recipe as JSON once it looks right
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin folio-bench -- [OPTIONS] <IMAGE_PATH>
//! ```
//!
//! Set `RUST_LOG=folio_pipeline=debug` to trace the update protocol.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use folio_pipeline::{
    CycleMode, Dimensions, ElementShape, ExecutionLog, Interpolation, Loader, NodeId, Pipeline,
    PipelineConfig, PipelineError, PortId, StageConfig, StructuringElement, ThresholdMode,
};

/// Recipe runner and diagnostics for folio.
///
/// Stages given as flags run in a fixed order: gray, resize, blur,
/// open, close, asf, threshold or otsu, invert. Without any stage flag
/// the default recipe (gray, threshold at 128) is used.
#[derive(Parser)]
#[command(name = "folio-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, TIFF, WebP).
    image_path: PathBuf,

    /// Convert to gray first.
    #[arg(long)]
    gray: bool,

    /// Rescale by this factor.
    #[arg(long)]
    scale: Option<f64>,

    /// Resampling filter for `--scale`.
    #[arg(long, value_enum, default_value_t = Resampling::CatmullRom)]
    interpolation: Resampling,

    /// Gaussian blur with this odd kernel size.
    #[arg(long)]
    blur: Option<u32>,

    /// Morphological opening with this radius.
    #[arg(long)]
    open: Option<u8>,

    /// Morphological closing with this radius.
    #[arg(long)]
    close: Option<u8>,

    /// Alternate sequential filter up to this radius.
    #[arg(long, num_args = 0..=1, default_missing_value = "2")]
    asf: Option<u8>,

    /// Structuring element shape for `--open`, `--close` and `--asf`.
    #[arg(long, value_enum, default_value_t = Shape::Square)]
    shape: Shape,

    /// Vertical radius for `--open` and `--close`, turning the square
    /// into a rectangle.
    #[arg(long)]
    vertical_radius: Option<u8>,

    /// Fixed threshold level.
    #[arg(long, conflicts_with = "otsu")]
    threshold: Option<f64>,

    /// Keep samples above `--threshold` instead of binarising.
    #[arg(long, requires = "threshold")]
    to_zero: bool,

    /// Otsu threshold.
    #[arg(long)]
    otsu: bool,

    /// Invert gray levels last.
    #[arg(long)]
    invert: bool,

    /// Treat wiring loops as errors.
    #[arg(long)]
    strict: bool,

    /// Full recipe as a JSON string.
    ///
    /// When provided, all stage flags are ignored. The JSON must be a
    /// valid `PipelineConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,

    /// Print the recipe as JSON and exit.
    #[arg(long)]
    print_config: bool,

    /// Write the final image as PNG.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Number of updates of the same pipeline.
    ///
    /// Runs after the first find every node up to date and compute
    /// nothing unless `--recompute` is given.
    #[arg(
        long,
        default_value_t = 1,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    runs: usize,

    /// Touch the loader before every run after the first, so each run
    /// recomputes the whole recipe (for timing).
    #[arg(long)]
    recompute: bool,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Log verbosity (-v debug, -vv trace) when `RUST_LOG` is unset.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Resampling filter selection.
#[derive(Clone, Copy, ValueEnum)]
enum Resampling {
    /// Nearest-neighbor (fastest, blocky).
    Nearest,
    /// Bilinear interpolation (fast, decent quality).
    Triangle,
    /// Bicubic Catmull-Rom (moderate, good quality).
    CatmullRom,
    /// Gaussian (moderate, smooth).
    Gaussian,
    /// Lanczos with 3 lobes (slowest, sharpest).
    Lanczos3,
}

impl From<Resampling> for Interpolation {
    fn from(r: Resampling) -> Self {
        match r {
            Resampling::Nearest => Self::Nearest,
            Resampling::Triangle => Self::Triangle,
            Resampling::CatmullRom => Self::CatmullRom,
            Resampling::Gaussian => Self::Gaussian,
            Resampling::Lanczos3 => Self::Lanczos3,
        }
    }
}

/// Structuring element shape selection.
#[derive(Clone, Copy, ValueEnum)]
enum Shape {
    /// Square of side `2r + 1`.
    Square,
    /// Pixels within city-block distance `r`.
    Diamond,
    /// Pixels within Euclidean distance `r`.
    Disk,
    /// Horizontal line of `2r + 1` pixels.
    Horizontal,
    /// Vertical line of `2r + 1` pixels.
    Vertical,
}

impl From<Shape> for ElementShape {
    fn from(s: Shape) -> Self {
        match s {
            Shape::Square => Self::Square,
            Shape::Diamond => Self::Diamond,
            Shape::Disk => Self::Disk,
            Shape::Horizontal => Self::Horizontal,
            Shape::Vertical => Self::Vertical,
        }
    }
}

fn element(cli: &Cli, radius: u8) -> StructuringElement {
    StructuringElement {
        shape: cli.shape.into(),
        radius,
        vertical_radius: cli.vertical_radius,
    }
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// stage flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    let mut stages = Vec::new();
    if cli.gray {
        stages.push(StageConfig::Gray);
    }
    if let Some(scale) = cli.scale {
        stages.push(StageConfig::Resize {
            scale,
            interpolation: cli.interpolation.into(),
        });
    }
    if let Some(kernel_size) = cli.blur {
        stages.push(StageConfig::Blur {
            kernel_size,
            sigma: 0.0,
        });
    }
    if let Some(radius) = cli.open {
        stages.push(StageConfig::Open {
            element: element(cli, radius),
        });
    }
    if let Some(radius) = cli.close {
        stages.push(StageConfig::Close {
            element: element(cli, radius),
        });
    }
    if let Some(max_radius) = cli.asf {
        stages.push(StageConfig::Asf {
            max_radius,
            shape: cli.shape.into(),
            open_first: true,
        });
    }
    if let Some(level) = cli.threshold {
        stages.push(StageConfig::Threshold {
            level,
            max_value: folio_pipeline::threshold::DEFAULT_MAX_VALUE,
            mode: if cli.to_zero {
                ThresholdMode::ToZero
            } else {
                ThresholdMode::Binary
            },
        });
    } else if cli.otsu {
        stages.push(StageConfig::Otsu);
    }
    if cli.invert {
        stages.push(StageConfig::Inverse);
    }

    let cycle_mode = if cli.strict {
        CycleMode::Strict
    } else {
        CycleMode::Lenient
    };
    if stages.is_empty() {
        return Ok(PipelineConfig {
            cycle_mode,
            ..PipelineConfig::default()
        });
    }
    Ok(PipelineConfig { stages, cycle_mode })
}

fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "folio_pipeline=debug",
        _ => "folio_pipeline=trace",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback)),
        )
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = config.validate() {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    if cli.print_config {
        return match serde_json::to_string_pretty(&config) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error serializing config: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let image_bytes = match std::fs::read(&cli.image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Image: {} ({} bytes)",
        cli.image_path.display(),
        image_bytes.len(),
    );
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut bench = match Bench::new(&image_bytes, &config) {
        Ok(bench) => bench,
        Err(e) => {
            eprintln!("Pipeline error: {e}");
            return ExitCode::FAILURE;
        }
    };
    println!("Source: {}", bench.source_dimensions);

    let mut all_logs = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        if run > 0
            && cli.recompute
            && let Err(e) = bench.pipeline.touch(bench.loader)
        {
            eprintln!("Pipeline error: {e}");
            return ExitCode::FAILURE;
        }

        let log = match bench.update() {
            Ok(log) => log,
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                return ExitCode::FAILURE;
            }
        };

        if cli.json {
            match serde_json::to_string_pretty(&log) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error serializing diagnostics: {e}");
                    return ExitCode::FAILURE;
                }
            }
        } else if log.runs().is_empty() {
            println!("Nothing recomputed: every node was up to date.");
        } else {
            println!("{}", log.report());
        }

        // Write the image on the first run only.
        if run == 0
            && let Some(ref path) = cli.output
            && let Err(e) = write_png(&bench, path)
        {
            eprintln!("Error writing PNG to {}: {e}", path.display());
        }

        all_logs.push(log);

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_logs);
    }

    ExitCode::SUCCESS
}

/// A pipeline built once from a recipe and updated once per run.
struct Bench {
    pipeline: Pipeline,
    loader: NodeId,
    tail: PortId,
    source_dimensions: Dimensions,
}

impl Bench {
    fn new(image_bytes: &[u8], config: &PipelineConfig) -> Result<Self, PipelineError> {
        let page = folio_pipeline::codec::decode(image_bytes)?;
        let source_dimensions = page.dimensions();

        let mut pipeline = Pipeline::new();
        pipeline.set_cycle_mode(config.cycle_mode);
        let loader = pipeline.add(Loader::with_image(page));
        let head = pipeline.output(loader)?;
        let tail = config.build(&mut pipeline, head)?;
        Ok(Self {
            pipeline,
            loader,
            tail,
            source_dimensions,
        })
    }

    /// Update the last port and return what this update did.
    fn update(&mut self) -> Result<ExecutionLog, PipelineError> {
        self.pipeline.update(self.tail)?;
        Ok(self.pipeline.take_execution_log())
    }
}

fn write_png(bench: &Bench, path: &Path) -> Result<(), String> {
    let image = bench
        .pipeline
        .buffer(bench.tail)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "pipeline produced no image".to_owned())?;
    println!("Output: {}", image.format());
    let png = folio_pipeline::codec::encode_png(image).map_err(|e| e.to_string())?;
    std::fs::write(path, &png).map_err(|e| e.to_string())?;
    eprintln!("PNG written to {} ({} bytes)", path.display(), png.len());
    Ok(())
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(logs: &[ExecutionLog]) {
    println!();
    println!("Summary ({} runs)\n{}", logs.len(), "=".repeat(60));

    if logs.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = logs
        .iter()
        .map(|log| log.total_duration().as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    let computes: Vec<usize> = logs.iter().map(|log| log.runs().len()).collect();
    let memoised = computes.iter().filter(|&&n| n == 0).count();
    println!("Computes per run: {computes:?}  ({memoised} fully memoised)");

    // Per-node means, keyed by position in the recipe.
    let mut per_node: BTreeMap<_, (String, Vec<f64>)> = BTreeMap::new();
    for run in logs.iter().flat_map(ExecutionLog::runs) {
        per_node
            .entry(run.node)
            .or_insert_with(|| (run.name.clone(), Vec::new()))
            .1
            .push(run.duration.as_secs_f64() * 1000.0);
    }

    println!();
    println!("{:<10} {:<20} {:>12}", "Node", "Filter", "Mean (ms)");
    println!("{}", "-".repeat(44));
    for (node, (name, samples)) in &per_node {
        let node_mean = samples.iter().sum::<f64>() / samples.len() as f64;
        println!("{:<10} {name:<20} {node_mean:>10.3}ms", node.to_string());
    }
}
