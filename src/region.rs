// src/region.rs
//! Area of interest, water occurrence and land-cover sources.

use crate::error::Result;
use crate::feature::Feature;
use crate::raster::{Mask, Raster};

/// Land-cover codes for developed land, medium and high intensity
pub const URBAN_CLASSES: &[u16] = &[23, 24];

/// Land-cover codes for forest, shrub, grassland and cultivated land
pub const NON_URBAN_CLASSES: &[u16] = &[41, 42, 43, 51, 52, 71, 72, 73, 74, 81, 82];

/// Supplies the inputs every stage depends on
pub trait RegionProvider: Send + Sync {
    /// The urban boundary being analysed
    fn aoi(&self) -> Result<Feature>;

    /// Water occurrence (0-100) on the analysis grid
    fn water_occurrence(&self) -> Result<Raster>;

    /// Land-cover class codes on the analysis grid
    fn landcover(&self) -> Result<Raster>;
}

/// Region held in memory
#[derive(Debug, Clone)]
pub struct StaticRegion {
    pub aoi: Feature,
    pub water_occurrence: Raster,
    pub landcover: Raster,
}

impl RegionProvider for StaticRegion {
    fn aoi(&self) -> Result<Feature> {
        Ok(self.aoi.clone())
    }

    fn water_occurrence(&self) -> Result<Raster> {
        Ok(self.water_occurrence.clone())
    }

    fn landcover(&self) -> Result<Raster> {
        Ok(self.landcover.clone())
    }
}

/// Keep-mask excluding every cell with non-zero water occurrence.
///
/// Cells where the occurrence source has no data were never observed as
/// water and are kept.
pub fn water_mask(occurrence: &Raster) -> Mask {
    let (rows, cols) = occurrence.shape();
    Mask::from_fn((rows, cols), |(row, col)| {
        occurrence.get(row, col).map_or(true, |v| v == 0.0)
    })
}

/// Keep-mask of cells whose land-cover code is in `classes`
pub fn class_mask(landcover: &Raster, classes: &[u16]) -> Mask {
    Mask::from_fn(landcover.shape(), |(row, col)| {
        in_classes(landcover.get(row, col), classes)
    })
}

fn in_classes(code: Option<f64>, classes: &[u16]) -> bool {
    code.is_some_and(|code| classes.iter().any(|&c| f64::from(c) == code.round()))
}

/// Water mask on the grid of `target`, nearest occurrence cell per pixel
pub fn water_mask_for(target: &Raster, occurrence: &Raster) -> Mask {
    if target.same_grid(occurrence) {
        return water_mask(occurrence);
    }
    let transform = *target.transform();
    Mask::from_fn(target.shape(), |(row, col)| {
        occurrence
            .sample(transform.pixel_center(row, col))
            .map_or(true, |v| v == 0.0)
    })
}

/// Class mask on the grid of `target`, nearest land-cover cell per pixel
pub fn class_mask_for(target: &Raster, landcover: &Raster, classes: &[u16]) -> Mask {
    if target.same_grid(landcover) {
        return class_mask(landcover, classes);
    }
    let transform = *target.transform();
    Mask::from_fn(target.shape(), |(row, col)| {
        in_classes(landcover.sample(transform.pixel_center(row, col)), classes)
    })
}
