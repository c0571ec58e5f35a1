//! Dsport: dataset import/export for bounding-box annotations.
//!
//! Dsport reads YOLO-family datasets into a small in-memory model, writes
//! them back out, and publishes written datasets so that an existing copy
//! is only replaced once the new one is complete.
//!
//! # Modules
//!
//! - [`ir`]: Dataset model (items, subsets, categories, media) and YOLO codecs
//! - [`policy`]: Per-record error isolation (fail fast or skip and record)
//! - [`export`]: Export context, `convert`/`patch`, and the directory publisher
//! - [`error`]: Error types for dsport operations

pub mod error;
pub mod export;
pub mod ir;
pub mod policy;

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};

pub use error::{DsportError, FatalAbort};

use export::{DatasetPatch, ExportOptions, ExportSummary};
use ir::io_yolo::{read_yolo_strict, StrictReadOptions, YoloExporter};
use ir::io_yolo_loose::{read_yolo_loose, LooseFlavor, LooseReadOptions};
use ir::{Dataset, ImageInfoSource, DEFAULT_SUBSET_NAME};
use policy::{ErrorPolicy, FailFast, Tolerant};

/// The dsport CLI application.
#[derive(Parser)]
#[command(name = "dsport")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Convert a dataset into the YOLO descriptor layout.
    Convert(ConvertArgs),
}

/// Input layouts accepted by `convert`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum InputFormat {
    /// `obj.data` descriptor with per-subset list files.
    Yolo,
    /// `images/<subset>` + `labels/<subset>` with `obj.names`.
    YoloLoose,
    /// `images/<subset>` + `labels/<subset>` with `data.yaml`.
    YoloUltralytics,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum PolicyArg {
    /// Stop at the first bad item or annotation.
    FailFast,
    /// Skip bad items and annotations, then print what was skipped.
    Tolerant,
}

/// Arguments for the convert subcommand.
#[derive(clap::Args)]
struct ConvertArgs {
    /// Input dataset (descriptor file or dataset root).
    input: PathBuf,

    /// Output directory.
    output: PathBuf,

    /// Input layout.
    #[arg(long, value_enum, default_value_t = InputFormat::Yolo)]
    from: InputFormat,

    /// Subset to read from a loose or Ultralytics layout.
    #[arg(long, default_value = DEFAULT_SUBSET_NAME)]
    subset: String,

    /// Image size index (`<id> <height> <width>` per line).
    #[arg(long)]
    image_info: Option<PathBuf>,

    /// Copy images next to the written annotations.
    #[arg(long)]
    save_media: bool,

    /// Extension for every saved image, e.g. 'png'.
    #[arg(long)]
    image_ext: Option<String>,

    /// Also write dataset_meta.json.
    #[arg(long)]
    save_dataset_meta: bool,

    /// Replace an existing output directory once the new copy is complete.
    #[arg(long)]
    overwrite: bool,

    /// What to do with malformed items and annotations.
    #[arg(long, value_enum, env = "DSPORT_ERROR_POLICY", default_value_t = PolicyArg::FailFast)]
    error_policy: PolicyArg,
}

/// Run the dsport CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), DsportError> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Convert(args)) => run_convert(args),
        None => {
            println!("dsport {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Dataset import/export for bounding-box annotations.");
            println!();
            println!("Run 'dsport --help' for usage information.");
            Ok(())
        }
    }
}

/// Execute the convert subcommand.
fn run_convert(args: ConvertArgs) -> Result<(), DsportError> {
    let summary = match args.error_policy {
        PolicyArg::FailFast => convert_with_policy(&args, &mut FailFast)?,
        PolicyArg::Tolerant => {
            let mut policy = Tolerant::new();
            let summary = convert_with_policy(&args, &mut policy)?;
            print!("{}", policy.report());
            summary
        }
    };

    println!(
        "Converted {} -> {}: {}",
        args.input.display(),
        args.output.display(),
        summary
    );
    Ok(())
}

fn convert_with_policy(
    args: &ConvertArgs,
    policy: &mut dyn ErrorPolicy,
) -> Result<ExportSummary, DsportError> {
    let image_info = match &args.image_info {
        Some(path) => ImageInfoSource::File(path.clone()),
        None => ImageInfoSource::Auto,
    };
    let mut dataset = read_input(args, image_info, policy)?;

    let options = ExportOptions {
        save_media: args.save_media,
        image_ext: args.image_ext.clone(),
        save_dataset_meta: args.save_dataset_meta,
        ..Default::default()
    };

    if args.overwrite {
        return export::patch(
            &YoloExporter,
            &mut dataset,
            &DatasetPatch::new(),
            &args.output,
            &options,
            policy,
        );
    }

    if !is_absent_or_empty(&args.output)? {
        return Err(DsportError::Config {
            path: args.output.clone(),
            message: "output directory is not empty; pass --overwrite to replace it".to_string(),
        });
    }
    export::convert(&YoloExporter, &mut dataset, &args.output, &options, policy)
}

fn read_input(
    args: &ConvertArgs,
    image_info: ImageInfoSource,
    policy: &mut dyn ErrorPolicy,
) -> Result<Dataset, DsportError> {
    let flavor = match args.from {
        InputFormat::Yolo => {
            return read_yolo_strict(&args.input, &StrictReadOptions { image_info });
        }
        InputFormat::YoloLoose => LooseFlavor::Loose,
        InputFormat::YoloUltralytics => LooseFlavor::Ultralytics,
    };

    let options = LooseReadOptions {
        subset: args.subset.clone(),
        urls: None,
        image_info,
        flavor,
    };
    read_yolo_loose(&args.input, &options, policy)
}

fn is_absent_or_empty(path: &Path) -> Result<bool, DsportError> {
    if !path.exists() {
        return Ok(true);
    }
    if !path.is_dir() {
        return Ok(false);
    }
    Ok(fs::read_dir(path).map_err(DsportError::Io)?.next().is_none())
}
