//! Thread-safe shared state for the localization threads.
//!
//! `StateHub` is shared between:
//! - Pose integrator: writes the pose every odometry period
//! - Grid corrector / bearing scanner: overwrite parts of the pose on line crossings
//! - Range samplers: one writer per ultrasonic direction
//! - Floor producer: writes the floor reading and raises line-crossing notifications
//! - Motion and behaviours: read pose, distances and the wall-follow flag
//!
//! Each region has its own lock, so a 10 ms pose update never waits on a
//! distance write or a listener change. Reads that span regions are not
//! jointly atomic.

pub mod dispatch;

use crate::common::types::{Direction, Pose};
use crate::config::DispatchConfig;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use self::dispatch::{Dispatcher, LineCrossing, LineCrossingListener};

/// Distance reported when a sensor hears no echo (cm)
pub const NO_ECHO: i32 = 255;

/// Raw and rolling-minimum distance for one direction (cm)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSample {
    pub raw: i32,
    pub filtered: i32,
}

impl Default for RangeSample {
    fn default() -> Self {
        RangeSample {
            raw: NO_ECHO,
            filtered: NO_ECHO,
        }
    }
}

/// Pose together with the write version it was read at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSnapshot {
    pub pose: Pose,
    pub version: u64,
}

#[derive(Debug, Default)]
struct PoseCell {
    pose: Pose,
    version: u64,
}

impl PoseCell {
    fn write(&mut self, pose: Pose) {
        self.pose = Pose::new(pose.x, pose.y, pose.theta);
        self.version = self.version.wrapping_add(1);
    }
}

/// Shared store for pose, distances, flags and line-crossing listeners
pub struct StateHub {
    pose: Mutex<PoseCell>,
    ranges: Mutex<[RangeSample; 3]>,
    wall_following: AtomicBool,
    reading: AtomicI32,
    listeners: Mutex<Vec<Arc<dyn LineCrossingListener>>>,
    notifications: AtomicU64,
    dispatcher: Dispatcher,
}

/// Shared handle passed to every component
pub type StateHubHandle = Arc<StateHub>;

fn same_listener(a: &Arc<dyn LineCrossingListener>, b: &Arc<dyn LineCrossingListener>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

impl StateHub {
    /// Create a hub with default dispatch settings
    pub fn new() -> Result<Self> {
        Self::with_dispatch(&DispatchConfig::default())
    }

    /// Create a hub whose notifications run on at most `config.workers` threads
    pub fn with_dispatch(config: &DispatchConfig) -> Result<Self> {
        Ok(StateHub {
            pose: Mutex::new(PoseCell::default()),
            ranges: Mutex::new([RangeSample::default(); 3]),
            wall_following: AtomicBool::new(false),
            reading: AtomicI32::new(0),
            listeners: Mutex::new(Vec::new()),
            notifications: AtomicU64::new(0),
            dispatcher: Dispatcher::new(config)?,
        })
    }

    // ---- pose region ----

    /// Set x (cm), y (cm) and theta (degrees) in one write
    pub fn set_pose(&self, x: f64, y: f64, theta: f64) {
        self.pose.lock().write(Pose { x, y, theta });
    }

    /// Consistent (x, y, theta) snapshot
    pub fn pose(&self) -> Pose {
        self.pose.lock().pose
    }

    /// Pose plus its write version, for a later [`StateHub::commit_pose`]
    pub fn pose_snapshot(&self) -> PoseSnapshot {
        let cell = self.pose.lock();
        PoseSnapshot {
            pose: cell.pose,
            version: cell.version,
        }
    }

    /// Write `pose` only if nothing has written the pose since `snapshot` was
    /// taken. Returns false (and writes nothing) otherwise.
    pub fn commit_pose(&self, snapshot: &PoseSnapshot, pose: Pose) -> bool {
        let mut cell = self.pose.lock();
        if cell.version != snapshot.version {
            return false;
        }
        cell.write(pose);
        true
    }

    /// Atomic read-modify-write of the pose. Returns the stored result.
    pub fn update_pose<F>(&self, update: F) -> Pose
    where
        F: FnOnce(&mut Pose),
    {
        let mut cell = self.pose.lock();
        let mut pose = cell.pose;
        update(&mut pose);
        cell.write(pose);
        cell.pose
    }

    /// Overwrite the x coordinate (cm)
    pub fn set_x(&self, x: f64) {
        self.update_pose(|pose| pose.x = x);
    }

    /// Current x coordinate (cm)
    pub fn x(&self) -> f64 {
        self.pose.lock().pose.x
    }

    /// Overwrite the y coordinate (cm)
    pub fn set_y(&self, y: f64) {
        self.update_pose(|pose| pose.y = y);
    }

    /// Current y coordinate (cm)
    pub fn y(&self) -> f64 {
        self.pose.lock().pose.y
    }

    /// Overwrite the heading (degrees)
    pub fn set_theta(&self, theta: f64) {
        self.update_pose(|pose| pose.theta = theta);
    }

    /// Current heading (degrees)
    pub fn theta(&self) -> f64 {
        self.pose.lock().pose.theta
    }

    // ---- distance region ----

    /// Store the raw distance (cm) for the sensor at `angle` degrees
    pub fn set_distance(&self, angle: i32, distance: i32) -> Result<()> {
        let slot = Direction::from_degrees(angle)?.index();
        self.ranges.lock()[slot].raw = distance;
        Ok(())
    }

    /// Raw distance (cm) for the sensor at `angle` degrees
    pub fn distance(&self, angle: i32) -> Result<i32> {
        let slot = Direction::from_degrees(angle)?.index();
        Ok(self.ranges.lock()[slot].raw)
    }

    /// Store the filtered distance (cm) for the sensor at `angle` degrees
    pub fn set_filtered_distance(&self, angle: i32, distance: i32) -> Result<()> {
        let slot = Direction::from_degrees(angle)?.index();
        self.ranges.lock()[slot].filtered = distance;
        Ok(())
    }

    /// Filtered distance (cm) for the sensor at `angle` degrees
    pub fn filtered_distance(&self, angle: i32) -> Result<i32> {
        let slot = Direction::from_degrees(angle)?.index();
        Ok(self.ranges.lock()[slot].filtered)
    }

    /// Store raw and filtered distances for one direction in one write
    pub fn record_range(&self, direction: Direction, raw: i32, filtered: i32) {
        self.ranges.lock()[direction.index()] = RangeSample { raw, filtered };
    }

    /// Raw and filtered distances for one direction
    pub fn range(&self, direction: Direction) -> RangeSample {
        self.ranges.lock()[direction.index()]
    }

    // ---- wall-follow flag ----

    /// Enable or disable side-sensor sampling
    pub fn set_wall_following(&self, enabled: bool) {
        self.wall_following.store(enabled, Ordering::SeqCst);
    }

    /// Whether the side sensors should be sampling
    pub fn wall_following(&self) -> bool {
        self.wall_following.load(Ordering::SeqCst)
    }

    // ---- floor reading ----

    /// Store the latest floor sensor reading
    pub fn set_reading(&self, value: i32) {
        self.reading.store(value, Ordering::SeqCst);
    }

    /// Latest floor sensor reading
    pub fn reading(&self) -> i32 {
        self.reading.load(Ordering::SeqCst)
    }

    // ---- listener region ----

    /// Register a line-crossing listener
    pub fn add_listener(&self, listener: Arc<dyn LineCrossingListener>) -> Result<()> {
        let mut listeners = self.listeners.lock();
        if listeners.iter().any(|known| same_listener(known, &listener)) {
            return Err(Error::DuplicateListener);
        }
        listeners.push(listener);
        Ok(())
    }

    /// Unregister a listener. Notifications raised after this returns do not
    /// reach it; callbacks already queued may still run.
    pub fn remove_listener(&self, listener: &Arc<dyn LineCrossingListener>) -> Result<()> {
        let mut listeners = self.listeners.lock();
        let position = listeners
            .iter()
            .position(|known| same_listener(known, listener))
            .ok_or(Error::UnknownListener)?;
        listeners.remove(position);
        Ok(())
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Notify every registered listener of a line crossing.
    ///
    /// The listener set is copied and the lock released before anything is
    /// dispatched, so callbacks may add or remove listeners. Returns the
    /// number of callbacks queued.
    pub fn notify_all(&self) -> usize {
        let listeners: Vec<_> = self.listeners.lock().clone();
        if listeners.is_empty() {
            return 0;
        }

        let event = LineCrossing {
            sequence: self.notifications.fetch_add(1, Ordering::SeqCst) + 1,
            reading: self.reading(),
        };
        log::trace!(
            "StateHub: line crossing {} -> {} listeners",
            event.sequence,
            listeners.len()
        );
        self.dispatcher.dispatch(listeners, event)
    }

    /// Wait until every queued callback has run. Returns false on timeout.
    pub fn wait_for_dispatch(&self, timeout: Duration) -> bool {
        self.dispatcher.wait_idle(timeout)
    }

    /// Stop dispatching notifications, waiting up to `timeout` for callbacks
    pub fn shutdown_dispatch(&self, timeout: Duration) {
        self.dispatcher.shutdown(timeout);
    }
}
