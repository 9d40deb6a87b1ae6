use super::util::EPSILON;
use super::{Point3d, Vector3d};
use crate::util::Interval;
use cgmath::prelude::*;

/// A parametric curve in 3D space.
pub trait ParametricCurve3d {
    /// Samples the parametric curve.
    fn sample(&self, t: f64) -> Point3d;

    /// Returns the minimum and maximum t-values that define the bounds of the curve.
    fn bounds(&self) -> Interval<f64>;

    /// Samples the derivative of the parametric curve.
    ///
    /// The default implementation approximates the derivative by sampling
    /// two very nearby points along the curve.
    fn sample_dt(&self, t: f64) -> Vector3d {
        let delta = self.bounds().length() * 0.0001;
        let p1 = self.sample(t);
        let p2 = self.sample(t + delta);
        (p2 - p1) / delta
    }
}

impl<T: ParametricCurve3d + ?Sized> ParametricCurve3d for &T {
    fn sample(&self, t: f64) -> Point3d {
        (&**self).sample(t)
    }

    fn bounds(&self) -> Interval<f64> {
        (&**self).bounds()
    }

    fn sample_dt(&self, t: f64) -> Vector3d {
        (&**self).sample_dt(t)
    }
}

/// Walks a curve and emits points that are `dist` apart along it,
/// returning the points and the total arc length.
///
/// The curve is first flattened into a dense polyline, so this works for
/// closed curves whose start and end coincide.
pub fn equidistant_points_along_curve(
    curve: &impl ParametricCurve3d,
    dist: f64,
) -> (Vec<Point3d>, f64) {
    let bounds = curve.bounds();

    // First pass: rough length estimate from a coarse polyline
    const COARSE_SAMPLES: usize = 256;
    let mut estimate = 0.0;
    let mut prev = curve.sample(bounds.min);
    for i in 1..=COARSE_SAMPLES {
        let p = curve.sample(bounds.lerp(i as f64 / COARSE_SAMPLES as f64));
        estimate += (p - prev).magnitude();
        prev = p;
    }

    // Second pass: a polyline dense relative to the requested spacing
    let n = usize::max(COARSE_SAMPLES, ((estimate / dist).ceil() as usize) * 8);
    let mut arcs = Vec::with_capacity(n + 1);
    let mut total = 0.0;
    let mut prev = curve.sample(bounds.min);
    arcs.push((0.0, prev));
    for i in 1..=n {
        let p = curve.sample(bounds.lerp(i as f64 / n as f64));
        total += (p - prev).magnitude();
        arcs.push((total, p));
        prev = p;
    }

    // Emit a point at every multiple of `dist` along the accumulated length
    let mut points = Vec::new();
    let mut idx = 0;
    let mut k = 0usize;
    loop {
        let target = k as f64 * dist;
        if target > total + EPSILON {
            break;
        }
        while idx + 2 < arcs.len() && arcs[idx + 1].0 < target {
            idx += 1;
        }
        let (d0, p0) = arcs[idx];
        let (d1, p1) = arcs[idx + 1];
        let span = d1 - d0;
        let f = if span > EPSILON { (target - d0) / span } else { 0.0 };
        points.push(Point3d::from_vec(p0.to_vec().lerp(p1.to_vec(), f)));
        k += 1;
    }
    if points.is_empty() {
        points.push(arcs[0].1);
    }

    // The final partial interval gets an extrapolated point so every
    // emitted segment spans exactly `dist`
    let last_point = *points.last().unwrap();
    let end_vec = arcs[arcs.len() - 1].1 - last_point;
    let end_magnitude = end_vec.magnitude();
    let mut length = (points.len() - 1) as f64 * dist;
    if end_magnitude > 0.001 * dist {
        length += end_magnitude;
        points.push(last_point + end_vec.normalize_to(dist));
    }

    (points, length)
}
