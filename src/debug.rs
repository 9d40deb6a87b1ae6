use crate::math::{CubicBezier3d, Point3d};
#[cfg(feature = "debug")]
use serde_json::json;

#[cfg(feature = "debug")]
thread_local!(
    static DEBUG_FRAME: std::cell::RefCell<Vec<serde_json::Value>> = Default::default();
);

#[allow(unused)]
pub(crate) fn debug_transition(name: &str, curve: &CubicBezier3d) {
    #[cfg(feature = "debug")]
    DEBUG_FRAME.with(|frame| {
        let points = curve.control_points().map(|p| [p.x, p.y, p.z]);
        frame.borrow_mut().push(json!({
            "type": "bezier",
            "name": name,
            "points": points,
        }))
    })
}

#[allow(unused)]
pub(crate) fn debug_marker(name: &str, point: Point3d) {
    #[cfg(feature = "debug")]
    DEBUG_FRAME.with(|frame| {
        frame.borrow_mut().push(json!({
            "type": "marker",
            "name": name,
            "point": [point.x, point.y, point.z],
        }))
    })
}

#[cfg(feature = "debug")]
pub(crate) fn take_debug_frame() -> serde_json::Value {
    json!(DEBUG_FRAME.with(|frame| frame.take()))
}
