//! Motion control boundary
//!
//! Drive control lives outside the localization core. The core only needs to
//! command in-place rotations for the bearing scan.

/// Blocking motion commands
pub trait Motion: Send + Sync {
    /// Rotate in place by `degrees` (negative = clockwise), returning once the
    /// rotation has completed
    fn turn(&self, degrees: f64);
}
