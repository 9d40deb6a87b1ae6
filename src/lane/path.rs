use crate::math::{
    equidistant_points_along_curve, safe_normalize, ParametricCurve3d, Point3d, QuadraticBezier3d,
    Vector3d,
};
use crate::util::wrap_position;
use cgmath::prelude::*;

/// The spacing of the resampled path segments, in m.
const PATH_SEGMENT_LEN: f64 = 0.5;

/// The arc-length parameterised geometry of a lane, resampled from a
/// parametric source curve into a chain of quadratic bezier segments.
#[derive(Clone)]
pub struct LanePath {
    scale: f64,
    length: f64,
    closed: bool,
    segments: Vec<QuadraticBezier3d>,
}

/// The result of sampling a [LanePath].
pub struct PathSample {
    /// The point on the path.
    pub point: Point3d,
    /// The tangent unit vector of the path.
    pub tangent: Vector3d,
}

impl LanePath {
    /// Creates a new [LanePath] from the given parametric curve,
    /// with the default step size.
    pub fn new(curve: &dyn ParametricCurve3d, closed: bool) -> Self {
        Self::with_step(curve, PATH_SEGMENT_LEN, closed)
    }

    /// Creates a new [LanePath] from the given parametric curve,
    /// with the given step size.
    pub fn with_step(curve: &dyn ParametricCurve3d, step: f64, closed: bool) -> Self {
        let (mut points, length) = equidistant_points_along_curve(&curve, step);

        // Ensure number of points are odd so they can be evenly divided among segments
        if points.len() % 2 == 0 {
            let p1 = points[points.len() - 2];
            let p2 = points[points.len() - 1];
            let p3 = Point3d::from_vec(Vector3d::lerp(p1.to_vec(), p2.to_vec(), 2.0));
            points.push(p3);
        }

        let mut segments = points
            .windows(3)
            .step_by(2)
            .map(|points| {
                let [p1, p2, p3]: [_; 3] = points.try_into().unwrap();
                let mid = Vector3d::lerp(p1.to_vec(), p3.to_vec(), 0.5);
                let control = Point3d::from_vec(Vector3d::lerp(p2.to_vec(), mid, -1.0));
                QuadraticBezier3d::new(&[p1, control, p3])
            })
            .collect::<Vec<_>>();

        // A degenerate source curve still yields a sampleable path
        if segments.is_empty() {
            let p = points[0];
            segments.push(QuadraticBezier3d::new(&[p, p, p]));
        }

        Self {
            scale: 0.5 / step,
            length,
            closed,
            segments,
        }
    }

    /// The length of the path in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Whether the path loops back on itself.
    pub fn closed(&self) -> bool {
        self.closed
    }

    /// Samples the path at the given longitudinal position.
    /// Positions wrap on closed paths and are clamped on open ones.
    pub fn sample(&self, pos: f64) -> PathSample {
        let pos = if self.closed {
            wrap_position(pos, self.length)
        } else {
            pos.clamp(0.0, self.length)
        };
        let (segment, t) = self.sample_internal(pos);
        PathSample {
            point: segment.sample(t),
            tangent: safe_normalize(segment.sample_dt(t)),
        }
    }

    fn sample_internal(&self, pos: f64) -> (&QuadraticBezier3d, f64) {
        let pos = pos * self.scale;

        let idx = usize::min(pos as u32 as _, self.segments.len() - 1);
        let segment = unsafe {
            // SAFETY: The way `idx` is calculated above ensures its within bounds
            self.segments.get_unchecked(idx)
        };

        let t = pos - (idx as f64);

        (segment, t)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::math::ArcSegment3d;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn path_is_arclength_parameterised() {
        let circle = ArcSegment3d::circle(Point3d::new(0.0, 0.0, 0.0), 30.0);
        let path = LanePath::new(&circle, true);

        assert_approx_eq!(path.length(), 30.0 * std::f64::consts::TAU, 0.5);

        let ts = (0..100)
            .map(|i| i as f64 * 0.01 * path.length())
            .collect::<Vec<_>>();
        for ts in ts.windows(2) {
            let p1 = path.sample(ts[0]).point;
            let p2 = path.sample(ts[1]).point;
            assert_approx_eq!((p2 - p1).magnitude(), ts[1] - ts[0], 0.01);
        }
    }

    #[test]
    fn closed_path_wraps_sampling() {
        let circle = ArcSegment3d::circle(Point3d::new(0.0, 0.0, 0.0), 30.0);
        let path = LanePath::new(&circle, true);
        let a = path.sample(0.0).point;
        let b = path.sample(path.length()).point;
        assert_approx_eq!(a.x, b.x, 0.1);
        assert_approx_eq!(a.y, b.y, 0.1);
    }

    #[test]
    fn tangent_is_unit_length() {
        let circle = ArcSegment3d::circle(Point3d::new(0.0, 0.0, 0.0), 30.0);
        let path = LanePath::new(&circle, true);
        for i in 0..20 {
            let tangent = path.sample(i as f64 * 0.05 * path.length()).tangent;
            assert_approx_eq!(tangent.magnitude(), 1.0, 1e-6);
        }
    }
}
