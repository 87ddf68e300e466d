// src/main.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use suhi_calc::cli::{Cli, Commands};
use suhi_calc::config::PipelineConfig;
use suhi_calc::error::{Stage, StageContext};
use suhi_calc::feature::props;
use suhi_calc::io::{read_aoi, write_features, write_json, write_raster};
use suhi_calc::processing::pipeline::{Reference, FIXED_REFERENCE, MATCHED_REFERENCE};
use suhi_calc::processing::reference::{
    area_matched_reference, fixed_reference, validate, BufferSearch,
};
use suhi_calc::processing::ParallelProcessor;
use suhi_calc::sink::LogSink;
use suhi_calc::utils::scaling::{kelvin_to_celsius, scaled_to_kelvin};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Run { config } => run(&cli, config)?,
        Commands::Buffers {
            aoi,
            fixed_distance,
            step,
            count,
        } => {
            let search = BufferSearch {
                start: *step,
                step: *step,
                count: *count,
            };
            buffers(&cli, aoi, *fixed_distance, &search)?;
        }
        Commands::Convert { value, scale } => {
            let kelvin = scaled_to_kelvin(*value, *scale);
            println!("Kelvin: {kelvin:.2}");
            println!("Celsius: {:.2}", kelvin_to_celsius(kelvin));
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // logs go to stderr, results to stdout
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn output_dir(cli: &Cli, configured: &Path) -> Result<PathBuf> {
    let dir = cli.output_dir.clone().unwrap_or_else(|| configured.to_path_buf());
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create output directory {}", dir.display()))?;
    Ok(dir)
}

/// Layer name as a file stem
fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn run(cli: &Cli, config_path: &Path) -> Result<()> {
    let mut config = PipelineConfig::from_path(config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;
    if cli.threads.is_some() {
        config.global.threads = cli.threads;
    }
    let out = output_dir(cli, &config.outputs.directory)?;

    let pipeline = config.build()?.with_sink(Arc::new(LogSink));
    info!(threads = pipeline.processor().threads(), window = %config.window, "starting S-UHI run");
    let output = pipeline.run()?;

    if config.outputs.features {
        let path = out.join("references.geojson");
        write_features(&path, &output.references)
            .in_stage(Stage::Export, || path.display().to_string())?;
    }
    if config.outputs.rasters {
        for layer in &output.rasters {
            let path = out.join(format!(
                "{}.{}",
                file_stem(&layer.name),
                config.outputs.raster_format.extension()
            ));
            write_raster(&layer.raster, &path, &layer.name)
                .in_stage(Stage::Export, || path.display().to_string())?;
        }
    }
    if config.outputs.report {
        let path = out.join("report.json");
        write_json(&output.report, &path)
            .in_stage(Stage::Export, || path.display().to_string())?;
    }

    for result in &output.report.results {
        println!(
            "{} / {}: S-UHI {:.2} °C (urban {:.2}, rural {})",
            result.estimator,
            result.reference,
            result.suhi,
            result.urban_mean.unwrap_or(f64::NAN),
            result
                .rural_mean
                .map_or_else(|| "no data".to_string(), |v| format!("{v:.2}")),
        );
    }
    println!("Processing complete: {}", out.display());
    Ok(())
}

fn buffers(cli: &Cli, aoi_path: &Path, fixed_distance: f64, search: &BufferSearch) -> Result<()> {
    let aoi = read_aoi(aoi_path)
        .with_context(|| format!("failed to read AOI {}", aoi_path.display()))?;
    validate(&aoi.geometry, "AOI")?;
    let processor = ParallelProcessor::new(cli.threads)?;

    let (fixed, matched) = processor.install(|| {
        rayon::join(
            || fixed_reference(&aoi, fixed_distance),
            || area_matched_reference(&aoi, search),
        )
    });
    let references = [
        Reference {
            name: FIXED_REFERENCE.to_string(),
            feature: fixed?,
        },
        Reference {
            name: MATCHED_REFERENCE.to_string(),
            feature: matched?,
        },
    ];

    let out = output_dir(cli, Path::new("."))?;
    let path = out.join("references.geojson");
    write_features(&path, &references)
        .with_context(|| format!("failed to write {}", path.display()))?;

    for reference in &references {
        println!(
            "{}: width {} area {:.0}",
            reference.name,
            reference.feature.property(props::BUFFER_WIDTH).unwrap_or(f64::NAN),
            reference.feature.area()
        );
    }
    println!("Processing complete: {}", path.display());
    Ok(())
}
