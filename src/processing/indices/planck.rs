// src/processing/indices/planck.rs
use crate::error::{Error, Result};
use crate::processing::parallel::IndexCalculator;
use crate::raster::Raster;
use crate::utils::scaling::KELVIN_OFFSET;

/// Effective wavelength of the emitted radiance term
pub const EMITTED_WAVELENGTH: f64 = 0.001145;

/// h * c / sigma
pub const RHO: f64 = 1.438;

/// Land surface temperature in Celsius from brightness temperature (K) and emissivity.
///
/// `ln(emissivity)` requires `emissivity > 0`.
pub fn surface_temperature(tb: f64, emissivity: f64) -> f64 {
    tb / (1.0 + (EMITTED_WAVELENGTH * tb / RHO) * emissivity.ln()) - KELVIN_OFFSET
}

/// Inverted Planck approximation over brightness temperature and emissivity rasters
pub struct PlanckInversion {
    brightness_index: usize,
    emissivity_index: usize,
}

impl PlanckInversion {
    pub fn new(brightness_index: usize, emissivity_index: usize) -> Self {
        Self {
            brightness_index,
            emissivity_index,
        }
    }
}

impl IndexCalculator for PlanckInversion {
    fn calculate(&self, inputs: &[&Raster]) -> Result<Raster> {
        let tb = inputs[self.brightness_index];
        let emissivity = inputs[self.emissivity_index];

        if let Some(bad) = emissivity
            .valid_values()
            .find(|&e| !(e.is_finite() && e > 0.0))
        {
            return Err(Error::NumericDomainError(format!(
                "emissivity {bad} outside the domain of ln"
            )));
        }

        tb.zip_with(emissivity, surface_temperature)
    }

    fn required_bands(&self) -> usize {
        2
    }

    fn name(&self) -> &str {
        "LST"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GeoTransform;

    #[test]
    fn unit_emissivity_is_brightness_temperature() {
        assert!((surface_temperature(300.0, 1.0) - 26.85).abs() < 1e-9);
    }

    #[test]
    fn lower_emissivity_raises_lst() {
        let bare = surface_temperature(300.0, 0.986);
        let vegetated = surface_temperature(300.0, 0.990);
        assert!(bare > vegetated);
        assert!(vegetated > 26.85);
        // 300 / (1 + 0.000796 * 300 * ln 0.986) - 273.15
        assert!((bare - 27.86).abs() < 0.01, "got {bare}");
    }

    #[test]
    fn non_positive_emissivity_is_a_domain_error() {
        let tb = Raster::filled(1, 2, 300.0, GeoTransform::default());
        let ep = Raster::from_vec(vec![0.99, 0.0], 1, 2, GeoTransform::default()).unwrap();
        let result = PlanckInversion::new(0, 1).calculate(&[&tb, &ep]);
        assert!(matches!(result, Err(Error::NumericDomainError(_))));
    }
}
