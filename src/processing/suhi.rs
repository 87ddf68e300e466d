// src/processing/suhi.rs
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::processing::zonal::ZonalStatistic;
use crate::raster::{Mask, Raster};

/// What to do when the rural reference has no valid pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuralFallback {
    /// Raise `DataUnavailable`
    #[default]
    Fail,
    /// Substitute 0 °C, the legacy behaviour
    Zero,
}

/// Rural reference temperature after applying the fallback policy
pub fn rural_reference(rural: &ZonalStatistic, fallback: RuralFallback) -> Result<f64> {
    match (rural.value(), fallback) {
        (Some(value), _) => Ok(value),
        (None, RuralFallback::Fail) => Err(Error::DataUnavailable(
            "rural reference has no valid pixels".into(),
        )),
        (None, RuralFallback::Zero) => {
            warn!("rural reference has no valid pixels, substituting 0");
            Ok(0.0)
        }
    }
}

/// Urban mean minus rural reference
pub fn suhi_scalar(
    urban: &ZonalStatistic,
    rural: &ZonalStatistic,
    fallback: RuralFallback,
) -> Result<f64> {
    let urban = urban.require(|| "urban mean has no valid pixels".into())?;
    Ok(urban - rural_reference(rural, fallback)?)
}

/// Per-pixel intensity: every urban pixel offset by the scalar rural reference
pub fn suhi_raster(
    lst: &Raster,
    urban_mask: &Mask,
    rural: &ZonalStatistic,
    fallback: RuralFallback,
) -> Result<Raster> {
    let reference = rural_reference(rural, fallback)?;
    Ok(lst.update_mask(urban_mask)?.offset(-reference))
}
