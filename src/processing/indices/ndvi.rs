// src/processing/indices/ndvi.rs
use crate::error::Result;
use crate::processing::parallel::IndexCalculator;
use crate::raster::Raster;

/// Normalized Difference Vegetation Index: (NIR - RED) / (NIR + RED)
pub struct Ndvi {
    nir_index: usize,
    red_index: usize,
    name: String,
}

impl Ndvi {
    pub fn new(nir_index: usize, red_index: usize, name: Option<String>) -> Self {
        Self {
            nir_index,
            red_index,
            name: name.unwrap_or_else(|| "NDVI".to_string()),
        }
    }
}

impl IndexCalculator for Ndvi {
    fn calculate(&self, inputs: &[&Raster]) -> Result<Raster> {
        let nir = inputs[self.nir_index];
        let red = inputs[self.red_index];

        // a zero denominator leaves the pixel masked
        nir.zip_with(red, |n, r| {
            let sum = n + r;
            if sum == 0.0 {
                f64::NAN
            } else {
                (n - r) / sum
            }
        })
    }

    fn required_bands(&self) -> usize {
        2
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GeoTransform;

    #[test]
    fn ndvi_known_values() {
        let nir = Raster::from_vec(vec![5000.0, 3000.0, 1000.0, 0.0], 2, 2, GeoTransform::default())
            .unwrap();
        let red = Raster::from_vec(vec![2500.0, 3000.0, 500.0, 0.0], 2, 2, GeoTransform::default())
            .unwrap();

        let ndvi = Ndvi::new(0, 1, None).calculate(&[&nir, &red]).unwrap();
        assert!((ndvi.get(0, 0).unwrap() - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(ndvi.get(0, 1), Some(0.0));
        assert!((ndvi.get(1, 0).unwrap() - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(ndvi.get(1, 1), None);
    }
}
