// src/io/reader.rs
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use geo::MultiPolygon;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{overlaps, SceneCatalog};
use crate::error::{Error, Result};
use crate::feature::Feature;
use crate::io::document::{is_document, read_document};
use crate::io::vector::read_aoi;
use crate::raster::{Collection, Raster, Scene};
use crate::region::RegionProvider;

/// Read band 1 of a raster file. Cells equal to the band's NoData value are masked.
///
/// `.json` raster documents are read directly, other formats need the `gdal` feature.
pub fn read_raster(path: &Path) -> Result<Raster> {
    if is_document(path) {
        return read_document(path);
    }
    read_geotiff(path)
}

#[cfg(feature = "gdal")]
fn read_geotiff(path: &Path) -> Result<Raster> {
    use gdal::Dataset;

    use crate::raster::GeoTransform;

    let ds = Dataset::open(path)?;
    let (width, height) = ds.raster_size();
    let transform = GeoTransform::from_gdal(ds.geo_transform()?);
    let projection = ds.projection();

    let band = ds.rasterband(1)?;
    let nodata = band.no_data_value();
    let buffer = band.read_as::<f64>((0, 0), (width, height), (width, height), None)?;
    let data = buffer
        .data()
        .iter()
        .map(|&v| match nodata {
            Some(nd) if v == nd => f64::NAN,
            _ => v,
        })
        .collect();

    debug!(path = %path.display(), width, height, "raster read");
    let raster = Raster::from_vec(data, height, width, transform)?;
    Ok(if projection.is_empty() {
        raster
    } else {
        raster.with_crs(projection)
    })
}

#[cfg(not(feature = "gdal"))]
fn read_geotiff(path: &Path) -> Result<Raster> {
    Err(Error::Config(format!(
        "cannot read {}: built without GDAL support (enable the `gdal` feature)",
        path.display()
    )))
}

/// One dated scene: band name to raster file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub date: NaiveDate,
    pub bands: BTreeMap<String, PathBuf>,
}

/// Collections of scene files, keyed by collection id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub collections: HashMap<String, Vec<ManifestEntry>>,
}

/// Catalog over GeoTIFF band files listed in a JSON manifest.
///
/// Relative band paths resolve against the manifest's directory. Files are
/// only read for scenes that pass the date filter.
#[derive(Debug, Clone)]
pub struct ManifestCatalog {
    manifest: Manifest,
    base: PathBuf,
}

impl ManifestCatalog {
    pub fn new(manifest: Manifest, base: impl Into<PathBuf>) -> Self {
        Self {
            manifest,
            base: base.into(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let manifest: Manifest = serde_json::from_str(&text)?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(Self::new(manifest, base))
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn load(&self, entry: &ManifestEntry) -> Result<Scene> {
        entry
            .bands
            .iter()
            .try_fold(Scene::new(entry.date), |scene, (name, path)| {
                Ok(scene.with_band(name.clone(), read_raster(&self.base.join(path))?))
            })
    }
}

impl SceneCatalog for ManifestCatalog {
    fn query(
        &self,
        collection_id: &str,
        geometry: &MultiPolygon<f64>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Collection> {
        let entries = self
            .manifest
            .collections
            .get(collection_id)
            .ok_or_else(|| Error::Config(format!("unknown collection '{collection_id}'")))?;

        let scenes = entries
            .par_iter()
            .filter(|entry| entry.date >= start && entry.date < end)
            .map(|entry| self.load(entry))
            .collect::<Result<Vec<_>>>()?;
        debug!(collection = collection_id, scenes = scenes.len(), "manifest scenes loaded");

        let scenes = scenes
            .into_iter()
            .filter(|scene| overlaps(scene, geometry))
            .collect();
        Ok(Collection::new(collection_id, scenes))
    }
}

/// Region read from a GeoJSON AOI and two raster files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRegion {
    pub aoi: PathBuf,
    pub water_occurrence: PathBuf,
    pub landcover: PathBuf,
}

impl RegionProvider for FileRegion {
    fn aoi(&self) -> Result<Feature> {
        read_aoi(&self.aoi)
    }

    fn water_occurrence(&self) -> Result<Raster> {
        read_raster(&self.water_occurrence)
    }

    fn landcover(&self) -> Result<Raster> {
        read_raster(&self.landcover)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::document::write_document;
    use crate::raster::GeoTransform;
    use geo::{Coord, Rect};

    const MANIFEST: &str = r#"{
        "collections": {
            "MODIS/061/MOD11A2": [
                {"date": "2020-06-09", "bands": {"LST_Day_1km": "modis/a2020161.tif"}},
                {"date": "2020-06-17", "bands": {"LST_Day_1km": "modis/a2020169.tif"}}
            ]
        }
    }"#;

    #[test]
    fn manifest_parses() {
        let manifest: Manifest = serde_json::from_str(MANIFEST).unwrap();
        let entries = &manifest.collections["MODIS/061/MOD11A2"];
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].bands["LST_Day_1km"], PathBuf::from("modis/a2020169.tif"));
    }

    #[test]
    fn files_outside_the_date_range_are_not_read() {
        let manifest: Manifest = serde_json::from_str(MANIFEST).unwrap();
        let catalog = ManifestCatalog::new(manifest, "/nonexistent");
        let aoi: MultiPolygon<f64> =
            Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 }).to_polygon().into();
        let day = |m, d| NaiveDate::from_ymd_opt(2021, m, d).unwrap();

        let scenes = catalog
            .query("MODIS/061/MOD11A2", &aoi, day(1, 1), day(12, 31))
            .unwrap();
        assert!(scenes.is_empty());
        assert!(matches!(
            catalog.query("LANDSAT/LC08", &aoi, day(1, 1), day(12, 31)),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn manifest_scenes_and_region_load_from_documents() {
        let dir = tempfile::tempdir().unwrap();
        let grid = GeoTransform::new(0.0, 4.0, 1.0, -1.0);
        fs::create_dir(dir.path().join("modis")).unwrap();
        write_document(
            &Raster::filled(4, 4, 15000.0, grid),
            &dir.path().join("modis/a2020161.json"),
        )
        .unwrap();
        write_document(&Raster::filled(4, 4, 0.0, grid), &dir.path().join("water.json")).unwrap();
        write_document(&Raster::filled(4, 4, 23.0, grid), &dir.path().join("nlcd.json")).unwrap();
        fs::write(
            dir.path().join("aoi.geojson"),
            r#"{"type": "Polygon", "coordinates": [[[0, 0], [4, 0], [4, 4], [0, 4], [0, 0]]]}"#,
        )
        .unwrap();
        let manifest_path = dir.path().join("scenes.json");
        fs::write(
            &manifest_path,
            r#"{"collections": {"modis": [
                {"date": "2020-06-09", "bands": {"LST_Day_1km": "modis/a2020161.json"}}
            ]}}"#,
        )
        .unwrap();

        let catalog = ManifestCatalog::from_path(&manifest_path).unwrap();
        let aoi: MultiPolygon<f64> =
            Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 4.0, y: 4.0 }).to_polygon().into();
        let day = |m, d| NaiveDate::from_ymd_opt(2020, m, d).unwrap();
        let scenes = catalog.query("modis", &aoi, day(1, 1), day(12, 31)).unwrap();
        assert_eq!(scenes.len(), 1);
        let band = scenes.scenes()[0].band("LST_Day_1km").unwrap();
        assert_eq!(band.get(3, 3), Some(15000.0));
        assert_eq!(*band.transform(), grid);

        let region = FileRegion {
            aoi: dir.path().join("aoi.geojson"),
            water_occurrence: dir.path().join("water.json"),
            landcover: dir.path().join("nlcd.json"),
        };
        assert!((region.aoi().unwrap().area() - 16.0).abs() < 1e-9);
        assert_eq!(region.landcover().unwrap().get(0, 0), Some(23.0));
        assert_eq!(region.water_occurrence().unwrap().valid_count(), 16);
    }
}
