// src/cli.rs
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "suhi-calc")]
#[command(version, about = "Surface urban heat island calculator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Worker threads, overrides the config (default: number of CPUs)
    #[arg(short = 'j', long, global = true)]
    pub threads: Option<usize>,

    /// Output directory, overrides the config
    #[arg(short, long, global = true)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline from a JSON config
    Run {
        /// Pipeline config file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Build the fixed and area-matched rural rings around an AOI
    Buffers {
        /// AOI as GeoJSON (projected CRS)
        #[arg(short, long)]
        aoi: PathBuf,

        /// Width of the fixed ring
        #[arg(long, default_value = "2000")]
        fixed_distance: f64,

        /// Step (and first width) of the area-matched search
        #[arg(long, default_value = "30")]
        step: f64,

        /// Number of candidate widths
        #[arg(long, default_value = "100")]
        count: usize,
    },

    /// Convert a raw composite LST value to Kelvin and Celsius
    Convert {
        /// Raw scaled value
        #[arg(long, allow_hyphen_values = true)]
        value: f64,

        /// Product scale factor
        #[arg(long, default_value = "0.02")]
        scale: f64,
    },
}
