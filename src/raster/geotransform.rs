// src/raster/geotransform.rs
use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};

/// North-up affine transform: `x = origin_x + col * pixel_width`,
/// `y = origin_y + row * pixel_height` (pixel_height is negative).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// From a GDAL coefficient array, rotation terms are ignored
    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        Self::new(coeffs[0], coeffs[3], coeffs[1], coeffs[5])
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            0.0,
            self.origin_y,
            0.0,
            self.pixel_height,
        ]
    }

    /// Nominal pixel size (absolute pixel width)
    pub fn pixel_size(&self) -> f64 {
        self.pixel_width.abs()
    }

    pub fn pixel_center(&self, row: usize, col: usize) -> Coord<f64> {
        Coord {
            x: self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            y: self.origin_y + (row as f64 + 0.5) * self.pixel_height,
        }
    }

    /// Fractional (row, col) of a map coordinate
    pub fn to_pixel(&self, coord: Coord<f64>) -> (f64, f64) {
        (
            (coord.y - self.origin_y) / self.pixel_height,
            (coord.x - self.origin_x) / self.pixel_width,
        )
    }

    pub fn extent(&self, rows: usize, cols: usize) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.origin_x,
                y: self.origin_y,
            },
            Coord {
                x: self.origin_x + cols as f64 * self.pixel_width,
                y: self.origin_y + rows as f64 * self.pixel_height,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_center_and_back() {
        let gt = GeoTransform::new(100.0, 500.0, 30.0, -30.0);
        let c = gt.pixel_center(2, 3);
        assert_eq!(c, Coord { x: 205.0, y: 425.0 });

        let (row, col) = gt.to_pixel(c);
        assert!((row - 2.5).abs() < 1e-12);
        assert!((col - 3.5).abs() < 1e-12);
    }

    #[test]
    fn gdal_round_trip_drops_rotation() {
        let gt = GeoTransform::from_gdal([10.0, 2.0, 0.5, 20.0, 0.5, -2.0]);
        assert_eq!(gt.to_gdal(), [10.0, 2.0, 0.0, 20.0, 0.0, -2.0]);
    }
}
