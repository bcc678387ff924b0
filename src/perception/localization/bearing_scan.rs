//! Rotation-scan localization
//!
//! The robot turns a full circle clockwise in place near a grid intersection.
//! The floor sensor, offset from the rotation center, sweeps a circle that
//! crosses each of the two nearby grid lines twice. The headings recorded at
//! those four crossings fix both the absolute bearing and the position of the
//! rotation center relative to the intersection.
//!
//! Crossings are expected in the order x-line, y-line, x-line, y-line, where
//! an x-line runs parallel to the x axis.

use crate::common::angles;
use crate::common::types::{Point2D, Pose};
use crate::config::{FloorSensorConfig, ScanConfig};
use crate::control::Motion;
use crate::error::Result;
use crate::state::{LineCrossing, LineCrossingListener, StateHubHandle};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Crossings recorded per rotation
pub const SCAN_CROSSINGS: usize = 4;

/// One full clockwise turn
const SCAN_ROTATION: f64 = -360.0;

/// Upper bound on waiting for queued crossing callbacks after a rotation
const DISPATCH_TIMEOUT: Duration = Duration::from_secs(2);

/// Floor sensor placement as seen by the solver
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanGeometry {
    /// Distance from the rotation center to the sensor (cm)
    pub distance: f64,
    /// Sensor direction relative to the heading (degrees)
    pub mount_angle: f64,
}

impl ScanGeometry {
    /// Solver geometry for a floor sensor mount
    pub fn from_sensor(sensor: &FloorSensorConfig) -> Self {
        ScanGeometry {
            distance: sensor.distance(),
            mount_angle: sensor.mount_angle(),
        }
    }
}

/// Bearing and position recovered from one rotation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanSolution {
    /// Position of the rotation center (cm)
    pub position: Point2D,
    /// Degrees to add to the odometry heading
    pub bearing_correction: f64,
}

/// A successful scan
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanFix {
    /// Pose written to the hub
    pub pose: Pose,
    /// Degrees added to the odometry heading
    pub bearing_correction: f64,
    /// Rotations used, including the successful one
    pub attempts: u32,
}

/// Result of [`BearingScanner::localize`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScanOutcome {
    Localized(ScanFix),
    /// No rotation produced exactly four crossings; the pose was not touched
    GaveUp { attempts: u32 },
}

impl ScanOutcome {
    /// Whether the scan produced a fix
    pub fn is_localized(&self) -> bool {
        matches!(self, ScanOutcome::Localized(_))
    }
}

/// Expected headings at a pair of crossings of the same line.
///
/// `diff` is the signed arc between the crossings. The midpoint of the short
/// arc is the heading at which the sensor points straight at the line, so the
/// sensor direction there must be the axis direction normal to that line.
/// Returns the corrected pair, `diff`, and the direction the line lies in.
fn expected_pair(
    first: f64,
    second: f64,
    mount_angle: f64,
    x_line: bool,
) -> (f64, f64, f64, f64) {
    let diff = angles::wrap_difference(first - second);
    let midpoint = first - diff / 2.0;
    let sensor_direction = (midpoint + mount_angle).to_radians();

    let toward_line = if x_line {
        if sensor_direction.sin() >= 0.0 {
            90.0
        } else {
            270.0
        }
    } else if sensor_direction.cos() >= 0.0 {
        0.0
    } else {
        180.0
    };

    let true_midpoint = toward_line - mount_angle;
    (
        true_midpoint + diff / 2.0,
        true_midpoint - diff / 2.0,
        diff,
        toward_line,
    )
}

/// Solve bearing and position from the headings at four crossings.
///
/// Only the headings of `samples` are used; positions are assumed not to have
/// moved during the turn. `reference` is the intersection the robot turned
/// next to.
pub fn solve_scan(
    samples: &[Pose; SCAN_CROSSINGS],
    geometry: &ScanGeometry,
    reference: Point2D,
) -> ScanSolution {
    let headings = samples.map(|pose| pose.theta);
    let (x_first, x_second, x_diff, x_toward) =
        expected_pair(headings[0], headings[2], geometry.mount_angle, true);
    let (y_first, y_second, y_diff, y_toward) =
        expected_pair(headings[1], headings[3], geometry.mount_angle, false);

    let expected = [x_first, y_first, x_second, y_second];
    let total_error: f64 = expected
        .iter()
        .zip(headings.iter())
        .map(|(expected, measured)| angles::wrap_difference(expected - measured))
        .sum();
    let bearing_correction = total_error / SCAN_CROSSINGS as f64;

    // Distance from the rotation center to each line, along the line normal
    let y = reference.y
        - geometry.distance * (x_diff / 2.0).to_radians().cos() * x_toward.to_radians().sin();
    let x = reference.x
        - geometry.distance * (y_diff / 2.0).to_radians().cos() * y_toward.to_radians().cos();

    ScanSolution {
        position: Point2D::new(x, y),
        bearing_correction,
    }
}

#[derive(Debug, Default)]
struct Recording {
    samples: [Pose; SCAN_CROSSINGS],
    count: usize,
    overcounted: bool,
    last_accepted: Option<Instant>,
}

/// Line-crossing listener that snapshots the pose at debounced crossings
pub struct ScanRecorder {
    hub: StateHubHandle,
    debounce: Duration,
    recording: Mutex<Recording>,
}

impl ScanRecorder {
    /// Recorder ignoring crossings closer than `debounce` to the last accepted one
    pub fn new(hub: StateHubHandle, debounce: Duration) -> Self {
        ScanRecorder {
            hub,
            debounce,
            recording: Mutex::new(Recording::default()),
        }
    }

    /// Handle one crossing; returns whether it was accepted
    pub fn record(&self) -> bool {
        let now = Instant::now();
        let mut recording = self.recording.lock();
        if let Some(last) = recording.last_accepted {
            if now.duration_since(last) < self.debounce {
                return false;
            }
        }
        recording.last_accepted = Some(now);

        if recording.count < SCAN_CROSSINGS {
            let slot = recording.count;
            recording.samples[slot] = self.hub.pose();
            recording.count += 1;
        } else {
            recording.overcounted = true;
        }
        true
    }

    /// Number of crossings accepted this attempt
    pub fn count(&self) -> usize {
        self.recording.lock().count
    }

    /// Whether more than four crossings arrived this attempt
    pub fn is_overcounted(&self) -> bool {
        self.recording.lock().overcounted
    }

    /// Clear the samples for a new attempt. The debounce timer carries over.
    pub fn reset(&self) {
        let mut recording = self.recording.lock();
        recording.samples = [Pose::default(); SCAN_CROSSINGS];
        recording.count = 0;
        recording.overcounted = false;
    }

    /// The four samples, if exactly four crossings were accepted
    pub fn take(&self) -> Option<[Pose; SCAN_CROSSINGS]> {
        let recording = self.recording.lock();
        if recording.count == SCAN_CROSSINGS && !recording.overcounted {
            Some(recording.samples)
        } else {
            None
        }
    }
}

impl LineCrossingListener for ScanRecorder {
    fn on_line_crossing(&self, event: &LineCrossing) {
        if self.record() {
            log::debug!("ScanRecorder: crossing {} accepted", event.sequence);
        }
    }
}

/// One-shot absolute localization by a full in-place rotation
pub struct BearingScanner {
    hub: StateHubHandle,
    motion: Arc<dyn Motion>,
    geometry: ScanGeometry,
    max_retries: u32,
    recorder: Arc<ScanRecorder>,
    registration: Arc<dyn LineCrossingListener>,
}

impl BearingScanner {
    /// Scanner turning with `motion` and committing fixes to `hub`
    pub fn new(
        hub: StateHubHandle,
        motion: Arc<dyn Motion>,
        sensor: &FloorSensorConfig,
        config: &ScanConfig,
    ) -> Self {
        let recorder = Arc::new(ScanRecorder::new(Arc::clone(&hub), config.debounce()));
        let registration: Arc<dyn LineCrossingListener> = recorder.clone();
        BearingScanner {
            hub,
            motion,
            geometry: ScanGeometry::from_sensor(sensor),
            max_retries: config.max_retries,
            recorder,
            registration,
        }
    }

    /// Sensor geometry used by the solver
    pub fn geometry(&self) -> &ScanGeometry {
        &self.geometry
    }

    /// Scan next to the origin intersection
    pub fn localize(&self) -> Result<ScanOutcome> {
        self.localize_at(Point2D::origin())
    }

    /// Scan next to the intersection at `reference`
    pub fn localize_at(&self, reference: Point2D) -> Result<ScanOutcome> {
        self.hub.add_listener(Arc::clone(&self.registration))?;
        let samples = self.rotate_until_four();
        self.hub.remove_listener(&self.registration)?;
        self.recorder.reset();

        let (samples, attempts) = match samples {
            Ok(found) => found,
            Err(attempts) => {
                log::warn!(
                    "BearingScanner: no clean scan after {} rotations, pose left unchanged",
                    attempts
                );
                return Ok(ScanOutcome::GaveUp { attempts });
            }
        };

        let solution = solve_scan(&samples, &self.geometry, reference);
        let pose = self.hub.update_pose(|pose| {
            pose.x = solution.position.x;
            pose.y = solution.position.y;
            pose.theta = angles::normalize_heading(pose.theta + solution.bearing_correction);
        });
        log::info!(
            "BearingScanner: localized at x={:.2} y={:.2} theta={:.2} (bearing {:+.2}°, {} rotations)",
            pose.x,
            pose.y,
            pose.theta,
            solution.bearing_correction,
            attempts
        );

        Ok(ScanOutcome::Localized(ScanFix {
            pose,
            bearing_correction: solution.bearing_correction,
            attempts,
        }))
    }

    /// Rotate until one turn yields exactly four crossings, retrying up to
    /// `max_retries` times. On failure returns the number of rotations tried.
    fn rotate_until_four(&self) -> std::result::Result<([Pose; SCAN_CROSSINGS], u32), u32> {
        let rotations = self.max_retries.saturating_add(1);
        for attempt in 1..=rotations {
            self.recorder.reset();
            self.motion.turn(SCAN_ROTATION);
            if !self.hub.wait_for_dispatch(DISPATCH_TIMEOUT) {
                log::warn!("BearingScanner: crossing callbacks still pending after rotation");
            }

            if let Some(samples) = self.recorder.take() {
                return Ok((samples, attempt));
            }
            log::warn!(
                "BearingScanner: rotation {} saw {}{} crossings, retrying",
                attempt,
                self.recorder.count(),
                if self.recorder.is_overcounted() { "+" } else { "" }
            );
        }
        Err(rotations)
    }
}
