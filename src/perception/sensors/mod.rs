//! Sensor interfaces for the localization core
//!
//! The hardware layer implements these traits; the core only sees cumulative
//! wheel rotations and ultrasonic echoes.
pub mod range_sampler;

pub use crate::common::types::Direction;
pub use self::range_sampler::{RangeSampler, SamplerState};

/// Cumulative wheel rotation counters, in degrees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WheelCounts {
    pub left: i64,
    pub right: i64,
}

/// Wheel encoder access
pub trait WheelEncoders: Send + Sync {
    /// Read both counters as one paired sample. Implementations should latch
    /// both wheels together so that a turn does not show up as a skew between
    /// the two values.
    fn read_counts(&self) -> WheelCounts;
}

/// One ultrasonic range sensor
pub trait UltrasonicSensor: Send {
    /// Emit a ping; the echo is available after the settle delay
    fn ping(&mut self);

    /// Distance of the last echo in cm, saturating at the no-echo sentinel
    fn distance(&mut self) -> i32;

    /// Put the sensor in low-power idle
    fn off(&mut self);
}
