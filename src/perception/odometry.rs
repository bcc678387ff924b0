//! Dead-reckoning pose integration
//!
//! Wheel rotations are turned into a translation and a heading change with a
//! differential-drive model and integrated at the midpoint heading. Each tick
//! is committed with a compare-and-swap against the pose version read at the
//! start of the tick: if a corrector wrote the pose in between, the tick is
//! dropped and the correction stands.

use super::sensors::{WheelCounts, WheelEncoders};
use crate::common::angles;
use crate::common::types::Pose;
use crate::config::DriveConfig;
use crate::lifecycle::CycleTask;
use crate::state::StateHubHandle;
use std::sync::Arc;
use std::time::Duration;

/// Motion of the rotation center over one tick
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionDelta {
    /// Distance travelled along the integration heading (cm)
    pub translation: f64,
    /// Heading change (degrees, counter-clockwise positive)
    pub rotation: f64,
}

/// Differential-drive kinematics with separately calibrated wheels
#[derive(Debug, Clone)]
pub struct DifferentialDriveModel {
    left_radius: f64,
    right_radius: f64,
    ccw_track_width: f64,
    cw_track_width: f64,
}

impl DifferentialDriveModel {
    pub fn new(config: &DriveConfig) -> Self {
        DifferentialDriveModel {
            left_radius: config.left_wheel_radius,
            right_radius: config.right_wheel_radius,
            ccw_track_width: config.ccw_track_width,
            cw_track_width: config.cw_track_width,
        }
    }

    /// Motion produced by the given wheel rotations (degrees)
    pub fn motion_delta(&self, left_degrees: f64, right_degrees: f64) -> MotionDelta {
        let left = left_degrees.to_radians() * self.left_radius;
        let right = right_degrees.to_radians() * self.right_radius;

        // Slip differs between left and right turns, hence two track widths
        let spread = right - left;
        let track_width = if spread >= 0.0 {
            self.ccw_track_width
        } else {
            self.cw_track_width
        };

        MotionDelta {
            translation: (left + right) / 2.0,
            rotation: (spread / track_width).to_degrees(),
        }
    }

    /// Apply `delta` to `pose` using the heading halfway through the turn
    pub fn integrate(&self, pose: Pose, delta: MotionDelta) -> Pose {
        let heading = (pose.theta + delta.rotation / 2.0).to_radians();
        Pose {
            x: pose.x + delta.translation * heading.cos(),
            y: pose.y + delta.translation * heading.sin(),
            theta: angles::normalize_heading(pose.theta + delta.rotation),
        }
    }
}

/// Result of one integration tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// The integrated pose was written
    Committed(Pose),
    /// Another writer touched the pose during the tick; nothing was written
    Discarded,
}

/// Periodic odometry task writing the integrated pose into the hub
pub struct PoseIntegrator {
    hub: StateHubHandle,
    encoders: Arc<dyn WheelEncoders>,
    model: DifferentialDriveModel,
    direction: i64,
    period: Duration,
    last: WheelCounts,
    discarded: u64,
}

impl PoseIntegrator {
    /// Create an integrator; the current encoder counts become the baseline
    pub fn new(hub: StateHubHandle, encoders: Arc<dyn WheelEncoders>, config: &DriveConfig) -> Self {
        let direction = i64::from(config.motor_direction);
        let raw = encoders.read_counts();
        PoseIntegrator {
            hub,
            encoders,
            model: DifferentialDriveModel::new(config),
            direction,
            period: config.odometry_period(),
            last: WheelCounts {
                left: raw.left * direction,
                right: raw.right * direction,
            },
            discarded: 0,
        }
    }

    /// Number of ticks dropped because a corrector wrote the pose
    pub fn discarded_ticks(&self) -> u64 {
        self.discarded
    }

    /// Integrate the encoder motion since the previous tick
    pub fn tick(&mut self) -> TickOutcome {
        let snapshot = self.hub.pose_snapshot();

        let raw = self.encoders.read_counts();
        let counts = WheelCounts {
            left: raw.left * self.direction,
            right: raw.right * self.direction,
        };
        let delta = self.model.motion_delta(
            (counts.left - self.last.left) as f64,
            (counts.right - self.last.right) as f64,
        );
        // The baseline advances even if the result is dropped below
        self.last = counts;

        let pose = self.model.integrate(snapshot.pose, delta);
        if self.hub.commit_pose(&snapshot, pose) {
            log::trace!(
                "PoseIntegrator: x={:.2} y={:.2} theta={:.2}",
                pose.x,
                pose.y,
                pose.theta
            );
            TickOutcome::Committed(pose)
        } else {
            self.discarded += 1;
            log::debug!(
                "PoseIntegrator: tick discarded after concurrent pose write ({} total)",
                self.discarded
            );
            TickOutcome::Discarded
        }
    }
}

impl CycleTask for PoseIntegrator {
    fn run_cycle(&mut self) {
        self.tick();
    }

    fn period(&self) -> Option<Duration> {
        Some(self.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateHub;
    use approx::assert_relative_eq;
    use parking_lot::Mutex;

    struct FakeEncoders {
        counts: Mutex<WheelCounts>,
    }

    impl FakeEncoders {
        fn new() -> Arc<Self> {
            Arc::new(FakeEncoders {
                counts: Mutex::new(WheelCounts::default()),
            })
        }

        fn advance(&self, left: i64, right: i64) {
            let mut counts = self.counts.lock();
            counts.left += left;
            counts.right += right;
        }
    }

    impl WheelEncoders for FakeEncoders {
        fn read_counts(&self) -> WheelCounts {
            *self.counts.lock()
        }
    }

    /// Encoders that simulate a corrector writing the pose mid-tick
    struct InterferingEncoders {
        hub: StateHubHandle,
        counts: Mutex<WheelCounts>,
        correction: Pose,
    }

    impl WheelEncoders for InterferingEncoders {
        fn read_counts(&self) -> WheelCounts {
            let mut counts = self.counts.lock();
            if counts.left > 0 {
                let c = self.correction;
                self.hub.set_pose(c.x, c.y, c.theta);
            }
            let now = *counts;
            counts.left += 360;
            counts.right += 360;
            now
        }
    }

    fn config() -> DriveConfig {
        DriveConfig::default()
    }

    #[test]
    fn straight_motion_moves_along_heading() {
        let hub = Arc::new(StateHub::new().unwrap());
        hub.set_pose(10.0, 5.0, 90.0);
        let encoders = FakeEncoders::new();
        let mut integrator = PoseIntegrator::new(Arc::clone(&hub), encoders.clone(), &config());

        encoders.advance(360, 360);
        assert!(matches!(integrator.tick(), TickOutcome::Committed(_)));

        let cfg = config();
        let left = std::f64::consts::TAU * cfg.left_wheel_radius;
        let right = std::f64::consts::TAU * cfg.right_wheel_radius;
        let rotation = ((right - left) / cfg.ccw_track_width).to_degrees();
        let heading = (90.0 + rotation / 2.0).to_radians();
        let translation = (left + right) / 2.0;

        let pose = hub.pose();
        assert_relative_eq!(pose.x, 10.0 + translation * heading.cos(), epsilon = 1e-9);
        assert_relative_eq!(pose.y, 5.0 + translation * heading.sin(), epsilon = 1e-9);
        assert_relative_eq!(pose.theta, 90.0 + rotation, epsilon = 1e-9);
    }

    #[test]
    fn clockwise_turn_uses_clockwise_track_width() {
        let cfg = config();
        let model = DifferentialDriveModel::new(&cfg);
        let delta = model.motion_delta(100.0, -100.0);

        let left = 100f64.to_radians() * cfg.left_wheel_radius;
        let right = -100f64.to_radians() * cfg.right_wheel_radius;
        assert_relative_eq!(delta.rotation, ((right - left) / cfg.cw_track_width).to_degrees());
        assert_relative_eq!(delta.translation, (left + right) / 2.0);
        assert!(delta.rotation < 0.0);
    }

    #[test]
    fn heading_wraps_into_full_turn() {
        let model = DifferentialDriveModel::new(&config());
        let pose = model.integrate(
            Pose::new(0.0, 0.0, 350.0),
            MotionDelta {
                translation: 0.0,
                rotation: 20.0,
            },
        );
        assert_relative_eq!(pose.theta, 10.0, epsilon = 1e-9);

        let pose = model.integrate(
            Pose::new(0.0, 0.0, 5.0),
            MotionDelta {
                translation: 0.0,
                rotation: -10.0,
            },
        );
        assert_relative_eq!(pose.theta, 355.0, epsilon = 1e-9);
    }

    #[test]
    fn motor_direction_flips_counts() {
        let hub = Arc::new(StateHub::new().unwrap());
        let encoders = FakeEncoders::new();
        let reversed = DriveConfig {
            motor_direction: -1,
            ..config()
        };
        let mut integrator = PoseIntegrator::new(Arc::clone(&hub), encoders.clone(), &reversed);

        encoders.advance(-360, -360);
        integrator.tick();
        assert!(hub.x() > 0.0);
    }

    #[test]
    fn concurrent_write_discards_tick() {
        let hub = Arc::new(StateHub::new().unwrap());
        let correction = Pose::new(30.48, 60.96, 45.0);
        let encoders = Arc::new(InterferingEncoders {
            hub: Arc::clone(&hub),
            counts: Mutex::new(WheelCounts::default()),
            correction,
        });
        let mut integrator = PoseIntegrator::new(Arc::clone(&hub), encoders, &config());

        assert_eq!(integrator.tick(), TickOutcome::Discarded);
        assert_eq!(hub.pose(), correction);
        assert_eq!(integrator.discarded_ticks(), 1);
    }

    #[test]
    fn idle_wheels_leave_pose_unchanged() {
        let hub = Arc::new(StateHub::new().unwrap());
        hub.set_pose(3.0, 4.0, 123.0);
        let encoders = FakeEncoders::new();
        let mut integrator = PoseIntegrator::new(Arc::clone(&hub), encoders, &config());

        integrator.tick();
        let pose = hub.pose();
        assert_relative_eq!(pose.x, 3.0);
        assert_relative_eq!(pose.y, 4.0);
        assert_relative_eq!(pose.theta, 123.0);
    }
}
