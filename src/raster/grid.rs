// src/raster/grid.rs
use geo::{BoundingRect, Contains, Coord, MultiPolygon, Point};
use ndarray::{Array2, Zip};

use crate::error::{Error, Result};
use crate::raster::GeoTransform;

/// Boolean validity grid, `true` keeps the cell
#[derive(Debug, Clone, PartialEq)]
pub struct Mask(Array2<bool>);

impl Mask {
    pub fn new(cells: Array2<bool>) -> Self {
        Self(cells)
    }

    /// Mask that keeps every cell
    pub fn all(rows: usize, cols: usize) -> Self {
        Self(Array2::from_elem((rows, cols), true))
    }

    pub fn from_fn(shape: (usize, usize), f: impl FnMut((usize, usize)) -> bool) -> Self {
        Self(Array2::from_shape_fn(shape, f))
    }

    pub fn shape(&self) -> (usize, usize) {
        self.0.dim()
    }

    pub fn get(&self, row: usize, col: usize) -> bool {
        self.0.get((row, col)).copied().unwrap_or(false)
    }

    pub fn count(&self) -> usize {
        self.0.iter().filter(|&&keep| keep).count()
    }

    pub fn cells(&self) -> &Array2<bool> {
        &self.0
    }

    /// Logical AND of two aligned masks
    pub fn and(&self, other: &Mask) -> Result<Mask> {
        check_shape(self.shape(), other.shape())?;
        Ok(Mask(
            Zip::from(&self.0)
                .and(&other.0)
                .map_collect(|&a, &b| a && b),
        ))
    }
}

fn check_shape(expected: (usize, usize), actual: (usize, usize)) -> Result<()> {
    if expected != actual {
        return Err(Error::SizeMismatch { expected, actual });
    }
    Ok(())
}

/// A georeferenced single band grid with a validity mask.
///
/// Rasters are never mutated in place: every transform returns a new value.
/// Masked-out cells are excluded from all reductions, whatever value they hold.
#[derive(Debug, Clone)]
pub struct Raster {
    values: Array2<f64>,
    valid: Mask,
    transform: GeoTransform,
    crs: Option<String>,
}

impl Raster {
    /// Wrap a grid of values, non-finite cells start out masked
    pub fn new(values: Array2<f64>, transform: GeoTransform) -> Self {
        let valid = Mask(values.mapv(f64::is_finite));
        Self {
            values,
            valid,
            transform,
            crs: None,
        }
    }

    pub fn filled(rows: usize, cols: usize, value: f64, transform: GeoTransform) -> Self {
        Self::new(Array2::from_elem((rows, cols), value), transform)
    }

    pub fn from_vec(
        data: Vec<f64>,
        rows: usize,
        cols: usize,
        transform: GeoTransform,
    ) -> Result<Self> {
        let len = data.len();
        let values = Array2::from_shape_vec((rows, cols), data).map_err(|_| Error::SizeMismatch {
            expected: (rows, cols),
            actual: (len / cols.max(1), cols),
        })?;
        Ok(Self::new(values, transform))
    }

    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = Some(crs.into());
        self
    }

    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn cols(&self) -> usize {
        self.values.ncols()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn crs(&self) -> Option<&str> {
        self.crs.as_deref()
    }

    pub fn pixel_size(&self) -> f64 {
        self.transform.pixel_size()
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn mask(&self) -> &Mask {
        &self.valid
    }

    /// Cell value, `None` when masked out or outside the grid
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if self.valid.get(row, col) {
            self.values.get((row, col)).copied()
        } else {
            None
        }
    }

    /// Value of the cell containing `coord`
    pub fn sample(&self, coord: Coord<f64>) -> Option<f64> {
        let (row, col) = self.transform.to_pixel(coord);
        if row < 0.0 || col < 0.0 {
            return None;
        }
        self.get(row.floor() as usize, col.floor() as usize)
    }

    /// Same shape and geotransform
    pub fn same_grid(&self, other: &Raster) -> bool {
        self.shape() == other.shape() && self.transform == other.transform
    }

    /// Stable identifier of the grid, used to key memoized masks
    pub fn grid_key(&self) -> String {
        let t = &self.transform;
        format!(
            "{}x{}@{},{}/{},{}",
            self.rows(),
            self.cols(),
            t.origin_x,
            t.origin_y,
            t.pixel_width,
            t.pixel_height
        )
    }

    pub fn valid_count(&self) -> usize {
        self.valid.count()
    }

    pub fn valid_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values
            .iter()
            .zip(self.valid.cells().iter())
            .filter_map(|(&v, &ok)| ok.then_some(v))
    }

    /// Shape check for masks, which carry no geotransform
    pub fn check_aligned(&self, shape: (usize, usize)) -> Result<()> {
        check_shape(self.shape(), shape)
    }

    /// Same shape and same geotransform as `other`
    pub fn check_grid(&self, other: &Raster) -> Result<()> {
        check_shape(self.shape(), other.shape())?;
        if self.transform != other.transform {
            return Err(Error::GridMismatch {
                expected: self.grid_key(),
                actual: other.grid_key(),
            });
        }
        Ok(())
    }

    /// Same grid and metadata with new values
    fn derive(&self, values: Array2<f64>, valid: Mask) -> Raster {
        Raster {
            values,
            valid,
            transform: self.transform,
            crs: self.crs.clone(),
        }
    }

    /// Apply `f` to every valid cell. Cells that become non-finite are masked.
    pub fn map(&self, f: impl Fn(f64) -> f64 + Sync + Send) -> Raster {
        let values = Zip::from(&self.values)
            .and(self.valid.cells())
            .par_map_collect(|&v, &ok| if ok { f(v) } else { f64::NAN });
        let valid = Zip::from(self.valid.cells())
            .and(&values)
            .map_collect(|&ok, v| ok && v.is_finite());
        self.derive(values, Mask(valid))
    }

    pub fn scale(&self, factor: f64) -> Raster {
        self.map(|v| v * factor)
    }

    pub fn offset(&self, delta: f64) -> Raster {
        self.map(|v| v + delta)
    }

    /// Cell-wise combination of two aligned rasters, valid where both are
    pub fn zip_with(
        &self,
        other: &Raster,
        f: impl Fn(f64, f64) -> f64 + Sync + Send,
    ) -> Result<Raster> {
        self.check_grid(other)?;
        let both = self.valid.and(&other.valid)?;
        let values = Zip::from(&self.values)
            .and(&other.values)
            .and(both.cells())
            .par_map_collect(|&a, &b, &ok| if ok { f(a, b) } else { f64::NAN });
        let valid = Zip::from(both.cells())
            .and(&values)
            .map_collect(|&ok, v| ok && v.is_finite());
        Ok(self.derive(values, Mask(valid)))
    }

    /// AND an additional mask into the validity mask
    pub fn update_mask(&self, mask: &Mask) -> Result<Raster> {
        let valid = self.valid.and(mask)?;
        Ok(self.derive(self.values.clone(), valid))
    }

    /// Cells whose centres fall inside `geometry`
    pub fn footprint(&self, geometry: &MultiPolygon<f64>) -> Mask {
        let Some(bounds) = geometry.bounding_rect() else {
            return Mask(Array2::from_elem(self.shape(), false));
        };
        let transform = self.transform;
        let cells = Zip::indexed(&self.values).par_map_collect(|(row, col), _| {
            let center = transform.pixel_center(row, col);
            center.x >= bounds.min().x
                && center.x <= bounds.max().x
                && center.y >= bounds.min().y
                && center.y <= bounds.max().y
                && geometry.contains(&Point::from(center))
        });
        Mask(cells)
    }

    /// Mask out every cell whose centre lies outside `geometry`
    pub fn clip(&self, geometry: &MultiPolygon<f64>) -> Raster {
        let footprint = self.footprint(geometry);
        let valid = Zip::from(self.valid.cells())
            .and(footprint.cells())
            .map_collect(|&a, &b| a && b);
        self.derive(self.values.clone(), Mask(valid))
    }

    /// (min, max, mean) over valid cells
    pub fn summary(&self) -> Option<(f64, f64, f64)> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in self.valid_values() {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        (count > 0).then(|| (min, max, sum / count as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    fn unit_grid(rows: usize, cols: usize, value: f64) -> Raster {
        Raster::filled(rows, cols, value, GeoTransform::new(0.0, rows as f64, 1.0, -1.0))
    }

    #[test]
    fn nan_cells_start_masked() {
        let r = Raster::from_vec(vec![1.0, f64::NAN, 3.0, 4.0], 2, 2, GeoTransform::default())
            .unwrap();
        assert_eq!(r.valid_count(), 3);
        assert_eq!(r.get(0, 1), None);
        assert_eq!(r.get(1, 1), Some(4.0));
    }

    #[test]
    fn from_vec_rejects_bad_length() {
        let r = Raster::from_vec(vec![1.0; 5], 2, 2, GeoTransform::default());
        assert!(matches!(r, Err(Error::SizeMismatch { .. })));
    }

    #[test]
    fn scale_and_offset_keep_mask() {
        let r = unit_grid(2, 2, 15000.0)
            .update_mask(&Mask::from_fn((2, 2), |(r, c)| r != c))
            .unwrap();
        let celsius = r.scale(0.02).offset(-273.15);
        assert_eq!(celsius.valid_count(), 2);
        assert!((celsius.get(0, 1).unwrap() - 26.85).abs() < 1e-9);
        assert_eq!(celsius.get(0, 0), None);
    }

    #[test]
    fn map_masks_non_finite_results() {
        let r = Raster::from_vec(vec![1.0, -1.0], 1, 2, GeoTransform::default()).unwrap();
        let logged = r.map(f64::ln);
        assert_eq!(logged.get(0, 0), Some(0.0));
        assert_eq!(logged.get(0, 1), None);
    }

    #[test]
    fn masks_combine_with_and() {
        let a = Mask::from_fn((2, 2), |(r, _)| r == 0);
        let b = Mask::from_fn((2, 2), |(_, c)| c == 0);
        let both = a.and(&b).unwrap();
        assert_eq!(both.count(), 1);
        assert!(both.get(0, 0));
        assert!(a.and(&Mask::all(3, 3)).is_err());
    }

    #[test]
    fn clip_uses_pixel_centres() {
        let r = unit_grid(4, 4, 1.0);
        // covers the lower-left 2x2 block of centres
        let square: MultiPolygon<f64> = polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 2.0, y: 2.0),
            (x: 0.0, y: 2.0),
        ]
        .into();
        let clipped = r.clip(&square);
        assert_eq!(clipped.valid_count(), 4);
        assert!(clipped.get(3, 0).is_some());
        assert!(clipped.get(0, 0).is_none());
    }

    #[test]
    fn sample_picks_containing_cell() {
        let r = Raster::from_vec(vec![1.0, 2.0, 3.0, 4.0], 2, 2, GeoTransform::new(0.0, 20.0, 10.0, -10.0))
            .unwrap();
        assert_eq!(r.sample(Coord { x: 15.0, y: 5.0 }), Some(4.0));
        assert_eq!(r.sample(Coord { x: -1.0, y: 5.0 }), None);
        assert_eq!(r.sample(Coord { x: 25.0, y: 5.0 }), None);
    }

    #[test]
    fn zip_with_requires_alignment() {
        let a = unit_grid(2, 2, 1.0);
        let b = unit_grid(3, 2, 1.0);
        assert!(matches!(
            a.zip_with(&b, |x, y| x + y),
            Err(Error::SizeMismatch { .. })
        ));

        // same shape, footprint shifted 1 km east
        let shifted = Raster::filled(2, 2, 1.0, GeoTransform::new(1000.0, 2.0, 1.0, -1.0));
        assert!(matches!(
            a.zip_with(&shifted, |x, y| x + y),
            Err(Error::GridMismatch { .. })
        ));

        let sum = a.zip_with(&unit_grid(2, 2, 2.0), |x, y| x + y).unwrap();
        assert_eq!(sum.summary(), Some((3.0, 3.0, 3.0)));
    }
}
