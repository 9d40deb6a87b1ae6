use super::curve::ParametricCurve3d;
use super::util::EPSILON;
use super::{Point3d, Vector3d};
use crate::util::Interval;
use cgmath::prelude::*;

/// A straight line segment.
#[derive(Copy, Clone, Debug)]
pub struct LineSegment3d {
    start: Point3d,
    end: Point3d,
}

impl LineSegment3d {
    pub const fn from_ends(start: Point3d, end: Point3d) -> Self {
        Self { start, end }
    }
}

impl ParametricCurve3d for LineSegment3d {
    fn sample(&self, t: f64) -> Point3d {
        Point3d::from_vec(self.start.to_vec().lerp(self.end.to_vec(), t))
    }

    fn bounds(&self) -> Interval<f64> {
        Interval { min: 0.0, max: 1.0 }
    }

    fn sample_dt(&self, _t: f64) -> Vector3d {
        self.end - self.start
    }
}

/// A circular arc lying in the plane spanned by two basis vectors.
#[derive(Copy, Clone, Debug)]
pub struct ArcSegment3d {
    centre: Point3d,
    radius: f64,
    start_angle: f64,
    sweep: f64,
    u: Vector3d,
    v: Vector3d,
}

impl ArcSegment3d {
    /// Creates an arc in the plane spanned by `u` and `v`.
    /// The radius is floored to avoid degenerate geometry.
    pub fn in_plane(
        centre: Point3d,
        radius: f64,
        start_angle: f64,
        sweep: f64,
        u: Vector3d,
        v: Vector3d,
    ) -> Self {
        Self {
            centre,
            radius: f64::max(radius, EPSILON),
            start_angle,
            sweep,
            u: u.normalize(),
            v: v.normalize(),
        }
    }

    /// Creates an arc in the ground (xy) plane.
    pub fn flat(centre: Point3d, radius: f64, start_angle: f64, sweep: f64) -> Self {
        Self::in_plane(
            centre,
            radius,
            start_angle,
            sweep,
            Vector3d::unit_x(),
            Vector3d::unit_y(),
        )
    }

    /// Creates a full circle in the ground (xy) plane, suitable for a closed loop lane.
    pub fn circle(centre: Point3d, radius: f64) -> Self {
        Self::flat(centre, radius, 0.0, std::f64::consts::TAU)
    }
}

impl ParametricCurve3d for ArcSegment3d {
    fn sample(&self, t: f64) -> Point3d {
        let angle = self.start_angle + t * self.sweep;
        self.centre + self.radius * (angle.cos() * self.u + angle.sin() * self.v)
    }

    fn bounds(&self) -> Interval<f64> {
        Interval { min: 0.0, max: 1.0 }
    }

    fn sample_dt(&self, t: f64) -> Vector3d {
        let angle = self.start_angle + t * self.sweep;
        self.radius * self.sweep * (-angle.sin() * self.u + angle.cos() * self.v)
    }
}

/// A uniform Catmull-Rom spline through a sequence of points.
#[derive(Clone, Debug)]
pub struct CatmullRomSpline3d {
    points: Vec<Point3d>,
    closed: bool,
}

impl CatmullRomSpline3d {
    /// Creates a spline through the given points.
    /// A closed spline connects the last point back to the first.
    pub fn new(points: Vec<Point3d>, closed: bool) -> Self {
        assert!(points.len() >= 2, "spline requires at least two points");
        Self { points, closed }
    }

    fn num_segments(&self) -> usize {
        if self.closed {
            self.points.len()
        } else {
            self.points.len() - 1
        }
    }

    /// Gets the four control points governing segment `i`.
    fn control_points(&self, i: usize) -> [Vector3d; 4] {
        let n = self.points.len();
        let at = |j: isize| -> Vector3d {
            let idx = if self.closed {
                j.rem_euclid(n as isize) as usize
            } else {
                j.clamp(0, n as isize - 1) as usize
            };
            self.points[idx].to_vec()
        };
        let i = i as isize;
        [at(i - 1), at(i), at(i + 1), at(i + 2)]
    }

    fn split(&self, t: f64) -> (usize, f64) {
        let n = self.num_segments();
        let t = t.clamp(0.0, n as f64);
        let i = usize::min(t as usize, n - 1);
        (i, t - i as f64)
    }
}

impl ParametricCurve3d for CatmullRomSpline3d {
    fn sample(&self, t: f64) -> Point3d {
        let (i, t) = self.split(t);
        let [p0, p1, p2, p3] = self.control_points(i);
        let t2 = t * t;
        let t3 = t2 * t;
        Point3d::from_vec(
            0.5 * (2.0 * p1
                + (p2 - p0) * t
                + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
                + (3.0 * p1 - p0 - 3.0 * p2 + p3) * t3),
        )
    }

    fn bounds(&self) -> Interval<f64> {
        Interval {
            min: 0.0,
            max: self.num_segments() as f64,
        }
    }

    fn sample_dt(&self, t: f64) -> Vector3d {
        let (i, t) = self.split(t);
        let [p0, p1, p2, p3] = self.control_points(i);
        let t2 = t * t;
        0.5 * ((p2 - p0)
            + 2.0 * (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t
            + 3.0 * (3.0 * p1 - p0 - 3.0 * p2 + p3) * t2)
    }
}

/// A single sub-segment of a composite curve.
#[derive(Clone, Debug)]
pub enum CurveSegment {
    Line(LineSegment3d),
    Arc(ArcSegment3d),
    CatmullRom(CatmullRomSpline3d),
}

impl ParametricCurve3d for CurveSegment {
    fn sample(&self, t: f64) -> Point3d {
        match self {
            CurveSegment::Line(c) => c.sample(t),
            CurveSegment::Arc(c) => c.sample(t),
            CurveSegment::CatmullRom(c) => {
                // Map the shared [0, 1] parameter onto the spline's own bounds.
                let b = c.bounds();
                c.sample(b.lerp(t))
            }
        }
    }

    fn bounds(&self) -> Interval<f64> {
        Interval { min: 0.0, max: 1.0 }
    }

    fn sample_dt(&self, t: f64) -> Vector3d {
        match self {
            CurveSegment::Line(c) => c.sample_dt(t),
            CurveSegment::Arc(c) => c.sample_dt(t),
            CurveSegment::CatmullRom(c) => {
                let b = c.bounds();
                c.sample_dt(b.lerp(t)) * b.length()
            }
        }
    }
}

impl From<LineSegment3d> for CurveSegment {
    fn from(c: LineSegment3d) -> Self {
        CurveSegment::Line(c)
    }
}

impl From<ArcSegment3d> for CurveSegment {
    fn from(c: ArcSegment3d) -> Self {
        CurveSegment::Arc(c)
    }
}

impl From<CatmullRomSpline3d> for CurveSegment {
    fn from(c: CatmullRomSpline3d) -> Self {
        CurveSegment::CatmullRom(c)
    }
}

/// An ordered sequence of sub-segments traversed end to end.
#[derive(Clone, Debug)]
pub struct CompositeCurve3d {
    segments: Vec<CurveSegment>,
}

impl CompositeCurve3d {
    pub fn new(segments: Vec<CurveSegment>) -> Self {
        assert!(!segments.is_empty(), "composite curve requires a segment");
        Self { segments }
    }

    fn split(&self, t: f64) -> (&CurveSegment, f64) {
        let n = self.segments.len();
        let t = t.clamp(0.0, n as f64);
        let i = usize::min(t as usize, n - 1);
        (&self.segments[i], t - i as f64)
    }
}

impl ParametricCurve3d for CompositeCurve3d {
    fn sample(&self, t: f64) -> Point3d {
        let (segment, t) = self.split(t);
        segment.sample(t)
    }

    fn bounds(&self) -> Interval<f64> {
        Interval {
            min: 0.0,
            max: self.segments.len() as f64,
        }
    }

    fn sample_dt(&self, t: f64) -> Vector3d {
        let (segment, t) = self.split(t);
        segment.sample_dt(t)
    }
}
