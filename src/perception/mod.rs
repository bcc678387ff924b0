//! Perception: sensing, dead reckoning and drift correction
pub mod filters;
pub mod localization;
pub mod odometry;
pub mod sensors;

pub use self::localization::{BearingScanner, GridCorrection, GridCorrector, ScanOutcome};
pub use self::odometry::{DifferentialDriveModel, PoseIntegrator, TickOutcome};
pub use self::sensors::{RangeSampler, UltrasonicSensor, WheelCounts, WheelEncoders};
