// src/utils/scaling.rs
use crate::raster::Raster;

/// Scale factor of the 8-day composite daytime LST product (raw units are K / 0.02)
pub const COMPOSITE_LST_SCALE: f64 = 0.02;

pub const KELVIN_OFFSET: f64 = 273.15;

/// NoData sentinel written to float32 exports
pub const NODATA_VALUE_FLOAT: f32 = -999.0;

pub fn scaled_to_kelvin(raw: f64, scale_factor: f64) -> f64 {
    raw * scale_factor
}

pub fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - KELVIN_OFFSET
}

/// Row-major float32 cells, masked cells replaced by the NoData sentinel
pub fn to_float32(raster: &Raster) -> Vec<f32> {
    let (rows, cols) = raster.shape();
    let mut data = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        for col in 0..cols {
            data.push(match raster.get(row, col) {
                Some(v) => v as f32,
                None => NODATA_VALUE_FLOAT,
            });
        }
    }
    data
}
