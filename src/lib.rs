// src/lib.rs
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod feature;
pub mod io;
pub mod processing;
pub mod raster;
pub mod region;
pub mod sink;
pub mod utils;

pub use error::{Error, Result};

// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
