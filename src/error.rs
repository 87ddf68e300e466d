// src/error.rs
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Pipeline stage an error is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Region,
    CompositeLst,
    PhysicalLst,
    ToolboxLst,
    ReferenceGeometry,
    ZonalReduction,
    Compositor,
    Export,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Region => "region & masks",
            Stage::CompositeLst => "composite LST",
            Stage::PhysicalLst => "physical LST",
            Stage::ToolboxLst => "toolbox LST",
            Stage::ReferenceGeometry => "reference geometry",
            Stage::ZonalReduction => "zonal reduction",
            Stage::Compositor => "S-UHI compositor",
            Stage::Export => "export",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("no scenes left in collection '{collection}' after filtering ({window})")]
    EmptyInputCollection { collection: String, window: String },

    #[error("no valid pixels: {0}")]
    DataUnavailable(String),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("numeric domain error: {0}")]
    NumericDomainError(String),

    #[error("raster size mismatch: expected {expected:?}, got {actual:?}")]
    SizeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("raster grids differ: expected {expected}, got {actual}")]
    GridMismatch { expected: String, actual: String },

    #[error("band '{band}' missing from scene dated {date}")]
    MissingBand { band: String, date: String },

    #[error("pixel budget exceeded: {requested} pixels requested, limit is {limit}")]
    PixelBudgetExceeded { requested: usize, limit: usize },

    #[error("computation cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{stage} failed for {context}: {source}")]
    Stage {
        stage: Stage,
        context: String,
        #[source]
        source: Box<Error>,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(String),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

impl Error {
    /// Innermost error, with stage attribution removed
    pub fn root(&self) -> &Error {
        match self {
            Error::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Attach stage and context to a failing result
pub trait StageContext<T> {
    fn in_stage(self, stage: Stage, context: impl FnOnce() -> String) -> Result<T>;
}

impl<T> StageContext<T> for Result<T> {
    fn in_stage(self, stage: Stage, context: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|e| match e {
            // keep the attribution closest to the failure
            e @ Error::Stage { .. } => e,
            e => Error::Stage {
                stage,
                context: context(),
                source: Box::new(e),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_wraps_once() {
        let inner: Result<()> = Err(Error::DataUnavailable("rural ring".into()));
        let wrapped = inner
            .in_stage(Stage::ZonalReduction, || "fixed ring".into())
            .in_stage(Stage::Compositor, || "ignored".into());

        let err = wrapped.unwrap_err();
        match &err {
            Error::Stage { stage, context, .. } => {
                assert_eq!(*stage, Stage::ZonalReduction);
                assert_eq!(context, "fixed ring");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(matches!(err.root(), Error::DataUnavailable(_)));
        assert!(err.to_string().contains("zonal reduction failed for fixed ring"));
    }
}
