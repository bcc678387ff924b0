//! Grid-line snap correction
//!
//! Whenever the floor sensor reports a line, the sensor position implied by
//! the current pose is compared with the nearest grid intersection. If the
//! sensor is unambiguously on one line (or on both, at a corner) the pose is
//! shifted so that the sensor sits exactly on that line.

use crate::common::types::{Point2D, Pose};
use crate::config::{FloorSensorConfig, GridConfig};
use crate::error::Result;
use crate::lifecycle::{LifecycleNode, LifecycleNodeBase, State};
use crate::state::{LineCrossing, LineCrossingListener, StateHubHandle};
use nalgebra::{Rotation2, Vector2};
use std::any::Any;
use std::sync::Arc;

/// Line distances below this (cm) count as exactly on the line
const ON_LINE_EPSILON: f64 = 1e-9;

/// Which axes a line crossing corrected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridCorrection {
    Both,
    XOnly,
    YOnly,
    None,
}

/// Fixed geometry of the grid and the floor sensor
#[derive(Debug, Clone)]
pub struct GridGeometry {
    tile_size: f64,
    bandwidth: f64,
    max_ratio: f64,
    mount: Vector2<f64>,
}

impl GridGeometry {
    /// Geometry from the grid and floor sensor settings
    pub fn new(grid: &GridConfig, sensor: &FloorSensorConfig) -> Self {
        GridGeometry {
            tile_size: grid.tile_size,
            bandwidth: grid.bandwidth,
            max_ratio: grid.max_ratio,
            mount: sensor.mount_vector(),
        }
    }

    /// Grid pitch (cm)
    pub fn tile_size(&self) -> f64 {
        self.tile_size
    }

    /// Sensor offset from the rotation center in the world frame
    pub fn sensor_offset(&self, theta: f64) -> Vector2<f64> {
        Rotation2::new(theta.to_radians()) * self.mount
    }

    /// World position of the floor sensor for a robot at `pose`
    pub fn sensor_position(&self, pose: &Pose) -> Point2D {
        pose.position() + self.sensor_offset(pose.theta)
    }

    /// Nearest grid line coordinate; halfway values round up
    pub fn nearest_line(&self, value: f64) -> f64 {
        self.tile_size * (value / self.tile_size + 0.5).floor()
    }

    /// Decide which axes to correct from the sensor's distance to each line
    pub fn classify(&self, dist_x: f64, dist_y: f64) -> GridCorrection {
        let dist_x = if dist_x < ON_LINE_EPSILON { 0.0 } else { dist_x };
        let dist_y = if dist_y < ON_LINE_EPSILON { 0.0 } else { dist_y };
        let ratio = self.max_ratio;
        if dist_x < self.bandwidth
            && dist_y < self.bandwidth
            && dist_x <= ratio * dist_y
            && dist_y <= ratio * dist_x
        {
            GridCorrection::Both
        } else if dist_x < self.bandwidth && ratio * dist_x <= dist_y {
            GridCorrection::XOnly
        } else if dist_y < self.bandwidth && ratio * dist_y <= dist_x {
            GridCorrection::YOnly
        } else {
            GridCorrection::None
        }
    }
}

struct CorrectionListener {
    hub: StateHubHandle,
    geometry: GridGeometry,
}

impl CorrectionListener {
    fn correct(&self) -> GridCorrection {
        let mut decision = GridCorrection::None;
        let geometry = &self.geometry;

        let corrected = self.hub.update_pose(|pose| {
            let sensor = geometry.sensor_position(pose);
            let line_x = geometry.nearest_line(sensor.x);
            let line_y = geometry.nearest_line(sensor.y);
            decision = geometry.classify((sensor.x - line_x).abs(), (sensor.y - line_y).abs());

            let offset = geometry.sensor_offset(pose.theta);
            if matches!(decision, GridCorrection::Both | GridCorrection::XOnly) {
                pose.x = line_x - offset.x;
            }
            if matches!(decision, GridCorrection::Both | GridCorrection::YOnly) {
                pose.y = line_y - offset.y;
            }
        });

        if decision == GridCorrection::None {
            log::debug!("GridCorrector: crossing ignored as ambiguous");
        } else {
            log::debug!(
                "GridCorrector: {:?} correction -> x={:.2} y={:.2}",
                decision,
                corrected.x,
                corrected.y
            );
        }
        decision
    }
}

impl LineCrossingListener for CorrectionListener {
    fn on_line_crossing(&self, _event: &LineCrossing) {
        self.correct();
    }
}

/// Snaps the pose onto grid lines while started
pub struct GridCorrector {
    base: LifecycleNodeBase,
    listener: Arc<CorrectionListener>,
    registration: Arc<dyn LineCrossingListener>,
}

impl GridCorrector {
    /// Corrector for `hub`; stopped until [`GridCorrector::start`]
    pub fn new(hub: StateHubHandle, grid: &GridConfig, sensor: &FloorSensorConfig) -> Self {
        let listener = Arc::new(CorrectionListener {
            hub,
            geometry: GridGeometry::new(grid, sensor),
        });
        let registration: Arc<dyn LineCrossingListener> = listener.clone();
        GridCorrector {
            base: LifecycleNodeBase::new("grid_corrector"),
            listener,
            registration,
        }
    }

    /// Grid and sensor geometry in use
    pub fn geometry(&self) -> &GridGeometry {
        &self.listener.geometry
    }

    /// Start listening for line crossings
    pub fn start(&self) -> Result<()> {
        self.listener.hub.add_listener(Arc::clone(&self.registration))
    }

    /// Stop listening for line crossings
    pub fn stop(&self) -> Result<()> {
        self.listener.hub.remove_listener(&self.registration)
    }

    /// Apply the correction for a crossing at the current pose
    pub fn correct(&self) -> GridCorrection {
        self.listener.correct()
    }
}

impl LifecycleNode for GridCorrector {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn on_configure(&mut self) -> Result<()> {
        self.base.set_state(State::Inactive);
        Ok(())
    }

    fn on_activate(&mut self) -> Result<()> {
        self.start()?;
        self.base.set_state(State::Active);
        Ok(())
    }

    fn on_deactivate(&mut self) -> Result<()> {
        self.stop()?;
        self.base.set_state(State::Inactive);
        Ok(())
    }

    fn on_cleanup(&mut self) -> Result<()> {
        self.base.set_state(State::Unconfigured);
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
