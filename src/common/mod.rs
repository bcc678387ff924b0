//! Common utilities and types for the localization core

pub mod angles;

/// Common types used across the codebase
pub mod types {
    use crate::common::angles;
    use crate::error::{Error, Result};

    /// A 2D point in cm
    pub type Point2D = nalgebra::Point2<f64>;

    /// Robot pose: position in cm, heading in degrees counter-clockwise from +x
    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    pub struct Pose {
        pub x: f64,
        pub y: f64,
        pub theta: f64,
    }

    impl Pose {
        /// Create a pose with the heading normalized to [0, 360)
        pub fn new(x: f64, y: f64, theta: f64) -> Self {
            Pose {
                x,
                y,
                theta: angles::normalize_heading(theta),
            }
        }

        /// Position part of the pose
        pub fn position(&self) -> Point2D {
            Point2D::new(self.x, self.y)
        }

        /// Heading in radians
        pub fn theta_rad(&self) -> f64 {
            self.theta.to_radians()
        }
    }

    /// Mounting direction of an ultrasonic sensor, counter-clockwise from the
    /// robot's right-hand side
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Direction {
        Right,
        Front,
        Left,
    }

    impl Direction {
        pub const ALL: [Direction; 3] = [Direction::Right, Direction::Front, Direction::Left];

        /// Map a mounting angle in degrees (0, 90 or 180) to a direction
        pub fn from_degrees(angle: i32) -> Result<Self> {
            match angle {
                0 => Ok(Direction::Right),
                90 => Ok(Direction::Front),
                180 => Ok(Direction::Left),
                other => Err(Error::InvalidArgument(format!(
                    "ultrasonic direction must be 0, 90 or 180 degrees, got {}",
                    other
                ))),
            }
        }

        pub fn degrees(self) -> i32 {
            match self {
                Direction::Right => 0,
                Direction::Front => 90,
                Direction::Left => 180,
            }
        }

        /// Slot in per-direction tables
        pub fn index(self) -> usize {
            match self {
                Direction::Right => 0,
                Direction::Front => 1,
                Direction::Left => 2,
            }
        }

        /// Side sensors only sample while wall following is enabled
        pub fn is_side(self) -> bool {
            self != Direction::Front
        }
    }
}
