// src/raster/mod.rs
pub mod collection;
pub mod geotransform;
pub mod grid;

pub use collection::{Collection, Reducer, Scene, TimeWindow};
pub use geotransform::GeoTransform;
pub use grid::{Mask, Raster};
