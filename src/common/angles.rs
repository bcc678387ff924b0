//! Angle range reduction in degrees

const FULL_TURN: f64 = 360.0;

/// Reduce `angle` (degrees) into a 360° window starting at `min_angle`.
///
/// With `open == false` the result lies in `[min_angle, min_angle + 360)`;
/// with `open == true` it lies in `(min_angle, min_angle + 360]`.
pub fn to_range(angle: f64, min_angle: f64, open: bool) -> f64 {
    let mut offset = (angle - min_angle).rem_euclid(FULL_TURN);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if offset >= FULL_TURN {
        offset -= FULL_TURN;
    }
    if open && offset == 0.0 {
        offset = FULL_TURN;
    }
    min_angle + offset
}

/// Heading normalized to [0, 360)
pub fn normalize_heading(theta: f64) -> f64 {
    to_range(theta, 0.0, false)
}

/// Angular difference reduced to (-180, 180]
pub fn wrap_difference(diff: f64) -> f64 {
    to_range(diff, -180.0, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn closed_range_wraps_above() {
        assert_abs_diff_eq!(to_range(370.0, 0.0, false), 10.0);
        assert_abs_diff_eq!(to_range(360.0, 0.0, false), 0.0);
        assert_abs_diff_eq!(to_range(-10.0, 0.0, false), 350.0);
    }

    #[test]
    fn open_range_excludes_minimum() {
        assert_abs_diff_eq!(to_range(0.0, 0.0, true), 360.0);
        assert_abs_diff_eq!(to_range(-540.0, -180.0, true), 180.0);
        assert_abs_diff_eq!(to_range(-180.0, -180.0, true), 180.0);
    }

    #[test]
    fn closed_range_keeps_minimum() {
        assert_abs_diff_eq!(to_range(-540.0, -180.0, false), -180.0);
        assert_abs_diff_eq!(to_range(180.0, -180.0, false), -180.0);
    }

    #[test]
    fn tiny_negative_heading_stays_below_full_turn() {
        let theta = normalize_heading(-1e-17);
        assert!((0.0..360.0).contains(&theta));
    }

    #[test]
    fn differences_fold_into_half_open_interval() {
        assert_abs_diff_eq!(wrap_difference(190.0), -170.0);
        assert_abs_diff_eq!(wrap_difference(-190.0), 170.0);
        assert_abs_diff_eq!(wrap_difference(-180.0), 180.0);
        assert_abs_diff_eq!(wrap_difference(45.0 - 225.0), 180.0);
    }
}
