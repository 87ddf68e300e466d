// src/io/document.rs
//! Single band rasters as JSON documents, read and written without GDAL.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster};
use crate::utils::scaling::NODATA_VALUE_FLOAT;

/// Row-major cell values plus georeferencing. Cells equal to `nodata` are masked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterDocument {
    pub rows: usize,
    pub cols: usize,
    pub transform: GeoTransform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs: Option<String>,
    #[serde(default)]
    pub nodata: Option<f64>,
    pub data: Vec<f64>,
}

impl RasterDocument {
    pub fn from_raster(raster: &Raster) -> Self {
        let nodata = f64::from(NODATA_VALUE_FLOAT);
        let (rows, cols) = raster.shape();
        let data = (0..rows)
            .flat_map(|row| (0..cols).map(move |col| (row, col)))
            .map(|(row, col)| raster.get(row, col).unwrap_or(nodata))
            .collect();
        Self {
            rows,
            cols,
            transform: *raster.transform(),
            crs: raster.crs().map(str::to_string),
            nodata: Some(nodata),
            data,
        }
    }

    pub fn into_raster(self) -> Result<Raster> {
        let nodata = self.nodata;
        let data = self
            .data
            .into_iter()
            .map(|v| match nodata {
                Some(nd) if v == nd => f64::NAN,
                _ => v,
            })
            .collect();
        let raster = Raster::from_vec(data, self.rows, self.cols, self.transform)?;
        Ok(match self.crs {
            Some(crs) => raster.with_crs(crs),
            None => raster,
        })
    }
}

/// `.json` files hold raster documents, anything else goes through GDAL
pub fn is_document(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

pub fn read_document(path: &Path) -> Result<Raster> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let document: RasterDocument = serde_json::from_str(&text)?;
    document.into_raster()
}

pub fn write_document(raster: &Raster, path: &Path) -> Result<()> {
    let text = serde_json::to_string(&RasterDocument::from_raster(raster))?;
    fs::write(path, text).map_err(|e| Error::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::Mask;

    #[test]
    fn masked_cells_and_transform_survive_a_file() {
        let transform = GeoTransform::new(583_000.0, 4_507_000.0, 30.0, -30.0);
        let raster = Raster::from_vec(vec![21.5, 22.0, 23.5, 24.0], 2, 2, transform)
            .unwrap()
            .update_mask(&Mask::from_fn((2, 2), |(r, c)| (r, c) != (1, 0)))
            .unwrap()
            .with_crs("EPSG:32618");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lst.json");
        write_document(&raster, &path).unwrap();
        let back = read_document(&path).unwrap();

        assert!(back.same_grid(&raster));
        assert_eq!(back.crs(), Some("EPSG:32618"));
        assert_eq!(back.get(0, 1), Some(22.0));
        assert_eq!(back.get(1, 0), None);
        assert_eq!(back.valid_count(), 3);
    }

    #[test]
    fn documents_are_picked_by_extension() {
        assert!(is_document(Path::new("water/occurrence.JSON")));
        assert!(!is_document(Path::new("water/occurrence.tif")));
    }

    #[test]
    fn wrong_length_is_a_size_mismatch() {
        let document = RasterDocument {
            rows: 2,
            cols: 2,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
            data: vec![1.0; 3],
        };
        assert!(matches!(document.into_raster(), Err(Error::SizeMismatch { .. })));
    }
}
