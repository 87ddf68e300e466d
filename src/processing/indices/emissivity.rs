// src/processing/indices/emissivity.rs
use crate::error::{Error, Result};
use crate::processing::parallel::IndexCalculator;
use crate::raster::Raster;

/// Emissivity gained per unit of fractional vegetation
pub const EMISSIVITY_VEGETATION_GAIN: f64 = 0.004;

/// Emissivity of a bare (FV = 0) surface
pub const EMISSIVITY_BARE: f64 = 0.986;

/// Fractional vegetation: NDVI linearly rescaled by the sample's own min/max.
///
/// Values outside `[min, max]` are passed through unclamped.
pub struct FractionalVegetation {
    min: f64,
    max: f64,
}

impl FractionalVegetation {
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !(min.is_finite() && max.is_finite()) || max <= min {
            return Err(Error::NumericDomainError(format!(
                "degenerate NDVI range [{min}, {max}]"
            )));
        }
        Ok(Self { min, max })
    }

    pub fn apply(&self, ndvi: f64) -> f64 {
        (ndvi - self.min) / (self.max - self.min)
    }
}

impl IndexCalculator for FractionalVegetation {
    fn calculate(&self, inputs: &[&Raster]) -> Result<Raster> {
        Ok(inputs[0].map(|ndvi| self.apply(ndvi)))
    }

    fn required_bands(&self) -> usize {
        1
    }

    fn name(&self) -> &str {
        "FV"
    }
}

/// Surface emissivity from fractional vegetation
pub struct Emissivity;

impl Emissivity {
    pub fn apply(fv: f64) -> f64 {
        fv * EMISSIVITY_VEGETATION_GAIN + EMISSIVITY_BARE
    }
}

impl IndexCalculator for Emissivity {
    fn calculate(&self, inputs: &[&Raster]) -> Result<Raster> {
        Ok(inputs[0].map(Emissivity::apply))
    }

    fn required_bands(&self) -> usize {
        1
    }

    fn name(&self) -> &str {
        "EM"
    }
}
