//! Dataset and model machinery for brick-kiln detection from multi-spectral
//! satellite tiles.

pub mod balance;
pub mod common;
pub mod dataset;
pub mod model;
