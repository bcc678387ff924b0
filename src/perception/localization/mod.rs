//! Drift correction from floor grid lines
pub mod bearing_scan;
pub mod grid_correction;

pub use self::bearing_scan::{BearingScanner, ScanFix, ScanGeometry, ScanOutcome, ScanRecorder, ScanSolution};
pub use self::grid_correction::{GridCorrection, GridCorrector, GridGeometry};
