// src/io/mod.rs
pub mod document;
pub mod reader;
pub mod vector;
pub mod writer;

pub use reader::{read_raster, FileRegion, Manifest, ManifestCatalog};
pub use vector::{read_aoi, write_features};
pub use writer::{write_json, write_raster, RasterFormat};
