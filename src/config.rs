//! Configuration for the localization core
//!
//! Calibrated hardware constants and timing parameters. Every section has
//! defaults matching the reference robot, so a TOML file only needs to list
//! the values it overrides.

use crate::error::{Error, Result};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level robot configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RobotConfig {
    pub drive: DriveConfig,
    pub floor_sensor: FloorSensorConfig,
    pub grid: GridConfig,
    pub ranging: RangingConfig,
    pub scan: ScanConfig,
    pub dispatch: DispatchConfig,
}

/// Wheel geometry and odometry timing
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Left wheel radius (cm)
    pub left_wheel_radius: f64,
    /// Right wheel radius (cm)
    pub right_wheel_radius: f64,
    /// Effective track width when turning counter-clockwise (cm)
    pub ccw_track_width: f64,
    /// Effective track width when turning clockwise (cm)
    pub cw_track_width: f64,
    /// +1 if forward motor rotation drives the robot forward, -1 otherwise
    pub motor_direction: i32,
    /// Odometry update period (ms)
    pub odometry_period_ms: u64,
}

/// Mounting of the downward floor-line sensor relative to the center of rotation
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FloorSensorConfig {
    /// Offset along the heading (cm), negative = behind the center
    pub forward_offset: f64,
    /// Offset perpendicular to the heading (cm), positive = right of the center
    pub lateral_offset: f64,
}

/// Floor grid layout and correction thresholds
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GridConfig {
    /// Spacing between parallel grid lines (cm)
    pub tile_size: f64,
    /// Maximum sensor-to-line distance accepted for a correction (cm)
    pub bandwidth: f64,
    /// Axis ratio separating corner crossings from single-line crossings
    pub max_ratio: f64,
}

/// Ultrasonic sampling parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RangingConfig {
    /// Delay between a ping and reading its echo (ms)
    pub settle_ms: u64,
    /// Rolling-minimum window length
    pub window: usize,
    /// Value reported when no echo is received (cm)
    pub no_echo: i32,
}

/// Rotation-scan localization parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Minimum spacing between accepted line crossings (ms)
    pub debounce_ms: u64,
    /// Extra rotations after the first before giving up
    pub max_retries: u32,
}

/// Line-crossing notification dispatch
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Upper bound on concurrently running listener callbacks
    pub workers: usize,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            left_wheel_radius: 2.076,
            right_wheel_radius: 2.095,
            ccw_track_width: 17.027,
            cw_track_width: 17.014,
            motor_direction: 1,
            odometry_period_ms: 10,
        }
    }
}

impl Default for FloorSensorConfig {
    fn default() -> Self {
        Self {
            forward_offset: -11.5,
            lateral_offset: -0.3,
        }
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            tile_size: 30.48,
            bandwidth: 5.0,
            max_ratio: 2.0,
        }
    }
}

impl Default for RangingConfig {
    fn default() -> Self {
        Self {
            settle_ms: 20,
            window: 5,
            no_echo: 255,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            max_retries: 3,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

impl DriveConfig {
    /// Odometry tick period
    pub fn odometry_period(&self) -> Duration {
        Duration::from_millis(self.odometry_period_ms)
    }
}

impl FloorSensorConfig {
    /// Sensor offset in the robot frame (x along the heading, y to the left)
    pub fn mount_vector(&self) -> Vector2<f64> {
        Vector2::new(self.forward_offset, -self.lateral_offset)
    }

    /// Distance from the center of rotation to the sensor (cm)
    pub fn distance(&self) -> f64 {
        self.mount_vector().norm()
    }

    /// Direction of the sensor relative to the heading (degrees)
    pub fn mount_angle(&self) -> f64 {
        let v = self.mount_vector();
        v.y.atan2(v.x).to_degrees()
    }
}

impl RangingConfig {
    /// Wait between a ping and reading its echo
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl ScanConfig {
    /// Minimum spacing between accepted crossings
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl RobotConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: RobotConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the algorithms cannot work with
    pub fn validate(&self) -> Result<()> {
        let drive = &self.drive;
        if drive.left_wheel_radius <= 0.0 || drive.right_wheel_radius <= 0.0 {
            return Err(Error::Config("Wheel radii must be positive".to_string()));
        }
        if drive.ccw_track_width <= 0.0 || drive.cw_track_width <= 0.0 {
            return Err(Error::Config("Track widths must be positive".to_string()));
        }
        if drive.motor_direction != 1 && drive.motor_direction != -1 {
            return Err(Error::Config("Motor direction must be 1 or -1".to_string()));
        }
        if drive.odometry_period_ms == 0 {
            return Err(Error::Config("Odometry period must be positive".to_string()));
        }
        if self.grid.tile_size <= 0.0 {
            return Err(Error::Config("Tile size must be positive".to_string()));
        }
        if self.grid.bandwidth <= 0.0 {
            return Err(Error::Config("Correction bandwidth must be positive".to_string()));
        }
        if self.grid.max_ratio < 1.0 {
            return Err(Error::Config("Max ratio must be at least 1.0".to_string()));
        }
        if self.ranging.window == 0 {
            return Err(Error::Config("Ranging window must hold at least one sample".to_string()));
        }
        if self.dispatch.workers == 0 {
            return Err(Error::Config("Dispatch needs at least one worker".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn defaults_are_valid() {
        RobotConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = RobotConfig::from_toml_str(
            r#"
            [grid]
            tile_size = 30.0

            [scan]
            debounce_ms = 50
            "#,
        )
        .unwrap();

        assert_relative_eq!(config.grid.tile_size, 30.0);
        assert_relative_eq!(config.grid.bandwidth, 5.0);
        assert_eq!(config.scan.debounce_ms, 50);
        assert_eq!(config.scan.max_retries, 3);
        assert_eq!(config.drive.odometry_period_ms, 10);
    }

    #[test]
    fn rejects_bad_motor_direction() {
        let err = RobotConfig::from_toml_str("[drive]\nmotor_direction = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = RobotConfig::from_toml_str("[grid\ntile_size = 1").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn floor_sensor_sits_behind_center() {
        let sensor = FloorSensorConfig::default();
        assert_relative_eq!(sensor.distance(), (11.5f64.powi(2) + 0.3f64.powi(2)).sqrt());
        // slightly left of straight back
        assert_relative_eq!(sensor.mount_angle(), 0.3f64.atan2(-11.5).to_degrees());
        assert!(sensor.mount_angle() > 178.0 && sensor.mount_angle() < 180.0);
    }
}
