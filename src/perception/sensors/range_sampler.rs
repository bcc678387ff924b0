//! Filtered ultrasonic sampling
//!
//! One sampler per sensor direction. The front sensor samples continuously;
//! the side sensors only sample while wall following is enabled and refill
//! their window after every idle period so stale readings never leak into the
//! filtered output.

use super::{Direction, UltrasonicSensor};
use crate::config::RangingConfig;
use crate::error::Result;
use crate::lifecycle::CycleTask;
use crate::perception::filters::{Filter, RollingMinimum};
use crate::state::{RangeSample, StateHubHandle};
use std::thread;
use std::time::Duration;

/// Sampler activity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    Idle,
    Sampling,
}

/// Pings one ultrasonic sensor and publishes raw and rolling-minimum distances
pub struct RangeSampler {
    direction: Direction,
    sensor: Box<dyn UltrasonicSensor>,
    hub: StateHubHandle,
    window: RollingMinimum,
    settle: Duration,
    no_echo: i32,
    state: SamplerState,
}

impl RangeSampler {
    /// Bind a sensor mounted at `angle` degrees (0, 90 or 180)
    pub fn new(
        angle: i32,
        sensor: Box<dyn UltrasonicSensor>,
        hub: StateHubHandle,
        config: &RangingConfig,
    ) -> Result<Self> {
        let direction = Direction::from_degrees(angle)?;
        Ok(RangeSampler {
            direction,
            sensor,
            hub,
            window: RollingMinimum::new(config.window),
            settle: config.settle_delay(),
            no_echo: config.no_echo,
            state: SamplerState::Idle,
        })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> SamplerState {
        self.state
    }

    /// Refill the whole window with fresh pings
    pub fn prime(&mut self) {
        let samples: Vec<i32> = (0..self.window.capacity()).map(|_| self.poll_raw()).collect();
        log::debug!(
            "RangeSampler {}°: window primed with {:?}",
            self.direction.degrees(),
            samples
        );
        self.window.prime(samples);
    }

    /// Ping, wait for the echo, filter and publish one sample
    pub fn sample(&mut self) -> RangeSample {
        let raw = self.poll_raw();
        let filtered = self.window.filter(raw);
        self.hub.record_range(self.direction, raw, filtered);
        RangeSample { raw, filtered }
    }

    /// One sampling cycle, honouring the wall-follow gate for side sensors
    pub fn step(&mut self) -> SamplerState {
        if self.direction.is_side() && !self.hub.wall_following() {
            if self.state == SamplerState::Sampling {
                log::debug!("RangeSampler {}°: idling", self.direction.degrees());
                self.sensor.off();
                self.state = SamplerState::Idle;
            }
            thread::sleep(self.settle);
            return self.state;
        }

        if self.state == SamplerState::Idle {
            log::debug!("RangeSampler {}°: resuming", self.direction.degrees());
            self.prime();
            self.state = SamplerState::Sampling;
        }
        self.sample();
        self.state
    }

    fn poll_raw(&mut self) -> i32 {
        self.sensor.ping();
        thread::sleep(self.settle);
        // Out-of-range echoes read as no echo
        self.sensor.distance().min(self.no_echo)
    }
}

impl CycleTask for RangeSampler {
    fn on_start(&mut self) {
        self.prime();
        self.state = SamplerState::Sampling;
    }

    fn run_cycle(&mut self) {
        self.step();
    }
}
