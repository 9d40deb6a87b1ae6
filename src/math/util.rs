use super::{Quat, Vector3d};
use cgmath::prelude::*;

/// Floor applied to lengths and magnitudes before division.
pub const EPSILON: f64 = 1e-6;

/// Normalises a vector, falling back to the positive x-axis when the
/// vector is too short to carry a direction.
pub fn safe_normalize(v: Vector3d) -> Vector3d {
    let mag = v.magnitude();
    if mag < EPSILON {
        Vector3d::unit_x()
    } else {
        v / mag
    }
}

/// Computes the rotation that maps the positive x-axis onto `tangent`.
///
/// Vehicles are modelled facing +x, so this is the orientation of a
/// vehicle aligned with a path tangent.
pub fn orientation_from_tangent(tangent: Vector3d) -> Quat {
    Quat::from_arc(Vector3d::unit_x(), safe_normalize(tangent), None)
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn orientation_rotates_unit_x() {
        let tan = Vector3d::new(0.0, 1.0, 0.0);
        let q = orientation_from_tangent(tan);
        let rotated = q * Vector3d::unit_x();
        assert_approx_eq!(rotated.x, 0.0, 1e-9);
        assert_approx_eq!(rotated.y, 1.0, 1e-9);
    }

    #[test]
    fn degenerate_tangent_falls_back() {
        let v = safe_normalize(Vector3d::new(0.0, 0.0, 0.0));
        assert_approx_eq!(v.magnitude(), 1.0);
    }
}
