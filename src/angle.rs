//! Electrical-angle arithmetic in the crate's fixed angular unit.
//!
//! Angles are stored as [`I16F16`] electrical degrees, so [`FULL_TURN`] (360)
//! represents one complete mains cycle. Every value that leaves this module is
//! wrapped into a canonical range first: `[0°, 360°)` for unsigned positions,
//! `(-180°, +180°]` for signed errors and offsets.

use fixed::{traits::LossyFrom as _, types::I16F16};

/// Fixed-point electrical angle in degrees.
pub type Angle = I16F16;

const fn deg(value: i32) -> Angle {
    Angle::from_bits(value << 16)
}

/// One full mains cycle.
pub const FULL_TURN: Angle = deg(360);
/// Half a mains cycle.
pub const HALF_TURN: Angle = deg(180);
/// Ideal spacing between two consecutive phases.
pub const THIRD_TURN: Angle = deg(120);
/// Rotation from a cosine-referenced spectrum phase to the sinusoid's
/// zero-crossing phase.
pub const QUARTER_TURN: Angle = deg(90);

/// Wraps an angle into `[0°, 360°)`.
pub fn normalize(angle: Angle) -> Angle {
    let mut a = angle % FULL_TURN;
    if a < Angle::ZERO {
        a += FULL_TURN;
    }
    a
}

/// Wraps an angle into `(-180°, +180°]`.
pub fn wrap_signed(angle: Angle) -> Angle {
    let a = normalize(angle);
    if a > HALF_TURN {
        a - FULL_TURN
    } else {
        a
    }
}

/// Wrap-aware difference `a - b`, in `(-180°, +180°]`.
pub fn wrap_sub(a: Angle, b: Angle) -> Angle {
    wrap_signed(a - b)
}

/// Converts a CORDIC result (radians) into degrees.
pub fn from_radians(radians: Angle) -> Angle {
    radians * 180 / Angle::lossy_from(fixed::consts::PI)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_range() {
        assert_eq!(normalize(deg(0)), deg(0));
        assert_eq!(normalize(deg(360)), deg(0));
        assert_eq!(normalize(deg(-30)), deg(330));
        assert_eq!(normalize(deg(750)), deg(30));
    }

    #[test]
    fn wrap_signed_range() {
        assert_eq!(wrap_signed(deg(190)), deg(-170));
        assert_eq!(wrap_signed(deg(-190)), deg(170));
        assert_eq!(wrap_signed(deg(180)), deg(180));
        assert_eq!(wrap_signed(deg(-180)), deg(180));
    }

    #[test]
    fn wrap_is_idempotent() {
        for raw in [-540i32, -180, -1, 0, 1, 179, 180, 359, 540] {
            let once = wrap_signed(deg(raw));
            assert_eq!(wrap_signed(once), once);
            let norm = normalize(deg(raw));
            assert_eq!(normalize(norm), norm);
        }
    }

    #[test]
    fn wrap_sub_crosses_boundary() {
        assert_eq!(wrap_sub(deg(170), deg(-170)), deg(-20));
        assert_eq!(wrap_sub(deg(-170), deg(170)), deg(20));
        assert_eq!(wrap_sub(deg(10), deg(350)), deg(20));
    }

    #[test]
    fn radians_to_degrees() {
        let pi = Angle::lossy_from(fixed::consts::PI);
        assert!(from_radians(pi).abs_diff(deg(180)) < Angle::from_num(0.01));
        assert!(from_radians(pi / 2).abs_diff(deg(90)) < Angle::from_num(0.01));
        assert!(from_radians(-pi / 2).abs_diff(deg(-90)) < Angle::from_num(0.01));
    }
}
