//! Simulated hardware for tests and the demo binary
//!
//! [`SimulatedDrive`] keeps a ground-truth pose and plays the roles of the
//! wheel encoders, the motion component and the floor producer: every motion
//! step advances the wheel counters and raises a line crossing on the hub when
//! the floor sensor passes over a grid line.
//! [`ScriptedUltrasonic`] replays a fixed list of echoes.

use crate::common::angles;
use crate::common::types::Pose;
use crate::config::{DriveConfig, RobotConfig};
use crate::control::Motion;
use crate::perception::localization::GridGeometry;
use crate::perception::sensors::{UltrasonicSensor, WheelCounts, WheelEncoders};
use crate::state::{StateHubHandle, NO_ECHO};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Floor reading while the sensor is over a line
pub const LINE_READING: i32 = 1;
/// Floor reading over plain floor
pub const FLOOR_READING: i32 = 0;

#[derive(Debug, Default)]
struct Truth {
    pose: Pose,
    left_degrees: f64,
    right_degrees: f64,
}

/// Ground-truth robot on a gridded floor
pub struct SimulatedDrive {
    hub: StateHubHandle,
    drive: DriveConfig,
    grid: GridGeometry,
    truth: Mutex<Truth>,
    turn_step: f64,
    drive_step: f64,
    step_delay: Duration,
}

impl SimulatedDrive {
    /// Robot at the origin facing +x, moving 1° or 0.5 cm per 1 ms step
    pub fn new(hub: StateHubHandle, config: &RobotConfig) -> Self {
        SimulatedDrive {
            hub,
            drive: config.drive.clone(),
            grid: GridGeometry::new(&config.grid, &config.floor_sensor),
            truth: Mutex::new(Truth::default()),
            turn_step: 1.0,
            drive_step: 0.5,
            step_delay: Duration::from_millis(1),
        }
    }

    /// Set the motion resolution and pacing
    pub fn with_steps(mut self, turn_step: f64, drive_step: f64, step_delay: Duration) -> Self {
        self.turn_step = turn_step.abs().max(f64::EPSILON);
        self.drive_step = drive_step.abs().max(f64::EPSILON);
        self.step_delay = step_delay;
        self
    }

    /// Teleport the robot without moving the wheels
    pub fn place(&self, pose: Pose) {
        self.truth.lock().pose = Pose::new(pose.x, pose.y, pose.theta);
    }

    /// Ground-truth pose
    pub fn truth(&self) -> Pose {
        self.truth.lock().pose
    }

    /// Drive straight by `distance` cm (negative = backwards)
    pub fn drive(&self, distance: f64) {
        let steps = (distance.abs() / self.drive_step).ceil() as usize;
        if steps == 0 {
            return;
        }
        let step = distance / steps as f64;
        for _ in 0..steps {
            self.advance(|truth, drive| {
                let heading = truth.pose.theta_rad();
                truth.pose.x += step * heading.cos();
                truth.pose.y += step * heading.sin();
                truth.left_degrees += (step / drive.left_wheel_radius).to_degrees();
                truth.right_degrees += (step / drive.right_wheel_radius).to_degrees();
            });
        }
    }

    /// Move one step and raise a crossing if the floor sensor passed a line
    fn advance<F>(&self, step: F)
    where
        F: FnOnce(&mut Truth, &DriveConfig),
    {
        let crossed = {
            let mut truth = self.truth.lock();
            let before = self.grid.sensor_position(&truth.pose);
            step(&mut *truth, &self.drive);
            truth.pose.theta = angles::normalize_heading(truth.pose.theta);
            let after = self.grid.sensor_position(&truth.pose);
            self.tile(before.x) != self.tile(after.x) || self.tile(before.y) != self.tile(after.y)
        };

        if crossed {
            self.hub.set_reading(LINE_READING);
            self.hub.notify_all();
        } else {
            self.hub.set_reading(FLOOR_READING);
        }
        if !self.step_delay.is_zero() {
            thread::sleep(self.step_delay);
        }
    }

    fn tile(&self, value: f64) -> i64 {
        (value / self.grid.tile_size()).floor() as i64
    }
}

impl Motion for SimulatedDrive {
    fn turn(&self, degrees: f64) {
        let steps = (degrees.abs() / self.turn_step).ceil() as usize;
        if steps == 0 {
            return;
        }
        let step = degrees / steps as f64;
        for _ in 0..steps {
            self.advance(|truth, drive| {
                let track_width = if step >= 0.0 {
                    drive.ccw_track_width
                } else {
                    drive.cw_track_width
                };
                let arc = step.to_radians() * track_width / 2.0;
                truth.pose.theta += step;
                truth.left_degrees -= (arc / drive.left_wheel_radius).to_degrees();
                truth.right_degrees += (arc / drive.right_wheel_radius).to_degrees();
            });
        }
    }
}

impl WheelEncoders for SimulatedDrive {
    fn read_counts(&self) -> WheelCounts {
        let truth = self.truth.lock();
        let direction = f64::from(self.drive.motor_direction);
        WheelCounts {
            left: (truth.left_degrees * direction).round() as i64,
            right: (truth.right_degrees * direction).round() as i64,
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    echoes: Vec<i32>,
    cursor: usize,
    last: Option<i32>,
    pings: usize,
    offs: usize,
}

/// Ultrasonic sensor replaying a fixed echo sequence.
///
/// Each ping consumes the next echo; once the script runs out the final echo
/// repeats. Clones share the same script, so a test can keep a clone to
/// inspect a sensor it handed to a sampler.
#[derive(Debug, Clone, Default)]
pub struct ScriptedUltrasonic {
    script: Arc<Mutex<Script>>,
}

impl ScriptedUltrasonic {
    /// Sensor that will replay `echoes` in order
    pub fn new(echoes: Vec<i32>) -> Self {
        ScriptedUltrasonic {
            script: Arc::new(Mutex::new(Script {
                echoes,
                ..Script::default()
            })),
        }
    }

    /// Pings received so far
    pub fn ping_count(&self) -> usize {
        self.script.lock().pings
    }

    /// Times the sensor was switched off
    pub fn off_count(&self) -> usize {
        self.script.lock().offs
    }
}

impl UltrasonicSensor for ScriptedUltrasonic {
    fn ping(&mut self) {
        let mut script = self.script.lock();
        let index = script.cursor.min(script.echoes.len().saturating_sub(1));
        script.last = script.echoes.get(index).copied();
        script.cursor += 1;
        script.pings += 1;
    }

    fn distance(&mut self) -> i32 {
        self.script.lock().last.unwrap_or(NO_ECHO)
    }

    fn off(&mut self) {
        self.script.lock().offs += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::odometry::PoseIntegrator;
    use crate::state::{LineCrossing, LineCrossingListener, StateHub};
    use approx::assert_abs_diff_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl LineCrossingListener for Counter {
        fn on_line_crossing(&self, _event: &LineCrossing) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn drive() -> (Arc<SimulatedDrive>, StateHubHandle) {
        let hub = Arc::new(StateHub::new().unwrap());
        let sim = SimulatedDrive::new(Arc::clone(&hub), &RobotConfig::default()).with_steps(
            1.0,
            0.5,
            Duration::ZERO,
        );
        (Arc::new(sim), hub)
    }

    #[test]
    fn odometry_follows_simulated_turn_and_drive() {
        let (sim, hub) = drive();
        let mut integrator = PoseIntegrator::new(Arc::clone(&hub), sim.clone(), &DriveConfig::default());

        sim.turn(-90.0);
        integrator.tick();
        sim.drive(30.0);
        integrator.tick();

        let truth = sim.truth();
        assert_abs_diff_eq!(truth.theta, 270.0, epsilon = 1e-9);
        assert_abs_diff_eq!(truth.y, -30.0, epsilon = 1e-9);

        let pose = hub.pose();
        assert_abs_diff_eq!(pose.theta, truth.theta, epsilon = 0.5);
        assert_abs_diff_eq!(pose.x, truth.x, epsilon = 0.2);
        assert_abs_diff_eq!(pose.y, truth.y, epsilon = 0.2);
    }

    #[test]
    fn full_turn_near_intersection_crosses_four_lines() {
        let (sim, hub) = drive();
        let counter = Arc::new(Counter::default());
        hub.add_listener(counter.clone()).unwrap();

        sim.place(Pose::new(-5.0, -5.0, 45.0));
        sim.turn(-360.0);
        assert!(hub.wait_for_dispatch(Duration::from_secs(2)));

        assert_eq!(counter.0.load(Ordering::SeqCst), 4);
        assert_abs_diff_eq!(sim.truth().theta, 45.0, epsilon = 1e-6);
    }

    #[test]
    fn scripted_sensor_repeats_last_echo() {
        let mut sensor = ScriptedUltrasonic::new(vec![40, 30]);
        let observer = sensor.clone();
        assert_eq!(sensor.distance(), NO_ECHO);

        let echoes: Vec<i32> = (0..4)
            .map(|_| {
                sensor.ping();
                sensor.distance()
            })
            .collect();
        assert_eq!(echoes, vec![40, 30, 30, 30]);
        sensor.off();
        assert_eq!(observer.ping_count(), 4);
        assert_eq!(observer.off_count(), 1);
    }
}
