// src/io/writer.rs
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::io::document::{is_document, write_document};
use crate::raster::Raster;

/// On-disk format of exported rasters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterFormat {
    /// Float32 GeoTIFF through GDAL
    GeoTiff,
    /// JSON raster document
    Json,
}

impl Default for RasterFormat {
    fn default() -> Self {
        if cfg!(feature = "gdal") {
            RasterFormat::GeoTiff
        } else {
            RasterFormat::Json
        }
    }
}

impl RasterFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            RasterFormat::GeoTiff => "tif",
            RasterFormat::Json => "json",
        }
    }
}

/// Write a raster with -999 NoData. `.json` paths get a raster document,
/// anything else a single-band float32 GeoTIFF.
pub fn write_raster(raster: &Raster, output_path: &Path, description: &str) -> Result<()> {
    if is_document(output_path) {
        return write_document(raster, output_path);
    }
    write_geotiff(raster, output_path, description)
}

#[cfg(feature = "gdal")]
fn write_geotiff(raster: &Raster, output_path: &Path, description: &str) -> Result<()> {
    use gdal::raster::{Buffer, RasterCreationOptions};
    use gdal::DriverManager;
    use tracing::debug;

    use crate::utils::scaling::{to_float32, NODATA_VALUE_FLOAT};

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let creation_options =
        RasterCreationOptions::from_iter(["COMPRESS=DEFLATE", "TILED=YES", "NUM_THREADS=ALL_CPUS"]);

    let (rows, cols) = raster.shape();
    let mut out_ds = driver.create_with_band_type_with_options::<f32, _>(
        output_path,
        cols,
        rows,
        1,
        &creation_options,
    )?;

    if let Some(crs) = raster.crs() {
        out_ds.set_projection(crs)?;
    }
    out_ds.set_geo_transform(&raster.transform().to_gdal())?;

    let mut band = out_ds.rasterband(1)?;
    band.set_no_data_value(Some(f64::from(NODATA_VALUE_FLOAT)))?;
    band.set_description(description)?;

    let mut buffer = Buffer::new((cols, rows), to_float32(raster));
    band.write((0, 0), (cols, rows), &mut buffer)?;
    out_ds.flush_cache()?;

    debug!(path = %output_path.display(), rows, cols, "raster written");
    Ok(())
}

#[cfg(not(feature = "gdal"))]
fn write_geotiff(_raster: &Raster, output_path: &Path, _description: &str) -> Result<()> {
    Err(Error::Config(format!(
        "cannot write {}: built without GDAL support (enable the `gdal` feature)",
        output_path.display()
    )))
}

/// Pretty-printed JSON
pub fn write_json<T: Serialize>(value: &T, output_path: &Path) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(output_path, text).map_err(|e| Error::io(output_path, e))
}
