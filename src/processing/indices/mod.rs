// src/processing/indices/mod.rs
pub mod emissivity;
pub mod ndvi;
pub mod planck;

// Re-export kernels
pub use emissivity::{Emissivity, FractionalVegetation};
pub use ndvi::Ndvi;
pub use planck::PlanckInversion;
