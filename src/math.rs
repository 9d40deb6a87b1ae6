//! Mathematical structs and functions.

use cgmath::{Point3, Quaternion, Vector3};
pub use bezier::{CubicBezier3d, QuadraticBezier3d};
pub use curve::{equidistant_points_along_curve, ParametricCurve3d};
pub use segment::{ArcSegment3d, CatmullRomSpline3d, CompositeCurve3d, CurveSegment, LineSegment3d};
pub use util::*;

mod bezier;
mod curve;
mod segment;
mod util;

/// A 3D point
pub type Point3d = Point3<f64>;

/// A 3D vector
pub type Vector3d = Vector3<f64>;

/// A rotation in 3D space
pub type Quat = Quaternion<f64>;
