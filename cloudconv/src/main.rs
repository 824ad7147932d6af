use anyhow::Context;
use clap::Parser;
use cloudconv::{progress_for_verbosity, resolve_destination, ConversionDriver};
use cloudconv_core::{DefaultTypes, ScalarType};
use cloudconv_io::CodecRegistry;
use std::io::Write;
use std::path::{Path, PathBuf};
use sysinfo::System;

fn parse_scalar_type(value: &str) -> Result<ScalarType, String> {
    value.parse::<ScalarType>().map_err(|e| e.to_string())
}

/// Convert point clouds between E57, LAS/LAZ, PLY, PTS, PCD and Potree
#[derive(Parser, Debug)]
#[command(name = "cloudconv", version, about, long_about = None)]
struct Cli {
    /// Point cloud file to convert
    #[arg(value_name = "ORIGIN")]
    origin_path: PathBuf,

    /// Output directory, or output file whose extension selects the format
    #[arg(short, long = "destination", alias = "dest")]
    destination: Option<PathBuf>,

    /// Target format: .las, .laz, .ply, .e57, .pts, .pcd or potree.
    /// Ignored when the destination is an existing file. Defaults to .las
    #[arg(short, long = "extension", alias = "ext")]
    extension: Option<String>,

    /// Allow overwriting an existing output file or directory
    #[arg(short, long = "unsafe", alias = "overwrite")]
    unsafe_overwrite: bool,

    /// 0 silent, 1 messages, 2 messages and progress bars, 3 raw progress
    #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=3))]
    verbose: u8,

    /// PotreeConverter executable, or a directory to search for it
    #[arg(long, value_name = "PATH")]
    potree_converter: Option<PathBuf>,

    /// Coordinate type of decoded points
    #[arg(long, default_value = "float32", value_parser = parse_scalar_type)]
    point_type: ScalarType,

    /// Type of colors a source without colors is filled with
    #[arg(long, default_value = "uint8", value_parser = parse_scalar_type)]
    color_type: ScalarType,

    /// Type of intensities a source without intensities is filled with
    #[arg(long, default_value = "float32", value_parser = parse_scalar_type)]
    intensity_type: ScalarType,
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        1 | 2 => "info",
        _ => "off",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();
}

/// A decoded cloud takes more room than its file, warn above 90% of the
/// available memory
fn exceeds_memory(file_size: u64, available: u64) -> bool {
    file_size as f64 > available as f64 * 0.9
}

fn check_memory(path: &Path) {
    let file_size = match std::fs::metadata(path) {
        Ok(metadata) => metadata.len(),
        Err(e) => {
            log::debug!("could not check memory requirements: {}", e);
            return;
        }
    };
    let mut system = System::new();
    system.refresh_memory();
    let available = system.available_memory();
    if available == 0 {
        log::debug!("available memory unknown on this system");
        return;
    }
    if exceeds_memory(file_size, available) {
        log::warn!(
            "file size (almost) exceeds available memory, at least {:.3} GB is recommended",
            file_size as f64 * 1.5 / (1024.0 * 1024.0 * 1024.0)
        );
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    check_memory(&cli.origin_path);

    let registry = CodecRegistry::with_default_codecs();
    let destination = resolve_destination(
        &cli.origin_path,
        cli.destination.as_deref(),
        cli.extension.as_deref(),
        cli.unsafe_overwrite,
        &registry,
    )
    .context("could not resolve the conversion target")?;
    log::info!("converting {} -> {}", cli.origin_path.display(), destination.path().display());

    let defaults = DefaultTypes::default()
        .with_points(cli.point_type)
        .with_colors(cli.color_type)
        .with_intensities(cli.intensity_type);
    let mut driver = ConversionDriver::new(registry, defaults);
    if let Some(path) = cli.potree_converter {
        driver = driver.with_potree_path(path);
    }

    let mut progress = progress_for_verbosity(cli.verbose);
    let report = driver
        .convert(&cli.origin_path, &destination, progress.as_mut())
        .with_context(|| format!("could not convert {}", cli.origin_path.display()))?;
    drop(progress);

    match report.points {
        Some(points) => log::info!(
            "converted {} points [read {:.3}s, write {:.3}s]",
            points,
            report.read_elapsed.as_secs_f64(),
            report.write_elapsed.as_secs_f64()
        ),
        None => log::info!("built Potree tree in {:.3}s", report.write_elapsed.as_secs_f64()),
    }
    Ok(())
}
