use crate::lane::Lane;
use crate::math::{safe_normalize, CubicBezier3d, ParametricCurve3d, Point3d, Vector3d, EPSILON};
use crate::util::wrap_position;
use crate::vehicle::Vehicle;
use crate::VehicleSet;
use arrayvec::ArrayVec;
use cgmath::prelude::*;
use itertools::Itertools;

/// The number of samples in a transition's arc length table.
const ARC_SAMPLES: usize = 17;

/// Progress within this distance of 1 commits the transition.
const COMPLETE_EPSILON: f64 = 1e-3;

/// Lateral blend of the control tangents toward the source-to-target chord.
const CHORD_BLEND: f64 = 0.25;

/// The fraction of the target lane length bounding the control offsets.
const MAX_CONTROL_FRACTION: f64 = 0.2;

/// The most a front neighbour may be slower than the merging vehicle
/// for the merge to keep its speed, in m/s.
const MAINTAIN_SPEED_TOLERANCE: f64 = 0.5;

/// How a lane change transition advances its progress.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LaneChangePacing {
    /// Progress follows the arc distance travelled along the transition.
    ByDistance,
    /// Progress follows elapsed time over the given duration in seconds.
    ByDuration(f64),
}

/// The result of a lane change safety check.
#[derive(Clone, Copy, Debug)]
pub struct LaneChangeCheck {
    /// Whether both the front and back clearances on the target lane are met.
    pub allowed: bool,
    /// Whether traffic ahead on the target lane is fast enough that the
    /// merging vehicle need not brake during the transition.
    pub maintain_speed: bool,
}

/// An in-progress lane change transition.
#[derive(Clone, Debug)]
pub(crate) struct LaneChange {
    /// The lateral index of the target lane.
    target_lane: usize,
    /// The longitudinal position on the target lane at which the
    /// transition commits.
    end_pos: f64,
    /// The transition curve bridging the two lanes.
    curve: CubicBezier3d,
    /// Cumulative arc lengths along the curve, for inverting distance
    /// into the curve parameter.
    arc_lengths: ArrayVec<f64, ARC_SAMPLES>,
    /// The total arc length of the transition in m.
    total_length: f64,
    /// Progress through the transition in [0, 1].
    progress: f64,
    /// How progress advances.
    pacing: LaneChangePacing,
    /// The frozen speed of a retain-speed transition, in m/s.
    retained_vel: Option<f64>,
}

/// One tick's advancement of a transition.
pub(crate) struct TransitionStep {
    /// The pose position read from the transition curve.
    pub point: Point3d,
    /// The pose tangent read from the transition curve.
    pub tangent: Vector3d,
    /// The target lane and position, present when the transition completed.
    pub commit: Option<(usize, f64)>,
}

/// A committed lane change, used to move the vehicle between lane rosters.
#[derive(Clone, Copy, Debug)]
pub(crate) struct MergeCommit {
    pub from_lane: usize,
    pub to_lane: usize,
    pub pos: f64,
}

impl LaneChange {
    fn new(
        target_lane: usize,
        end_pos: f64,
        curve: CubicBezier3d,
        pacing: LaneChangePacing,
        retained_vel: Option<f64>,
    ) -> Self {
        let points: ArrayVec<Point3d, ARC_SAMPLES> = (0..ARC_SAMPLES)
            .map(|i| curve.sample(i as f64 / (ARC_SAMPLES - 1) as f64))
            .collect();
        let mut arc_lengths = ArrayVec::new();
        arc_lengths.push(0.0);
        let mut total = 0.0;
        for (a, b) in points.iter().tuple_windows() {
            total += (b - a).magnitude();
            arc_lengths.push(total);
        }
        Self {
            target_lane,
            end_pos,
            curve,
            arc_lengths,
            total_length: total,
            progress: 0.0,
            pacing,
            retained_vel,
        }
    }

    /// The speed frozen for the duration of the transition, if any.
    pub fn retained_vel(&self) -> Option<f64> {
        self.retained_vel
    }

    /// The lateral index of the target lane.
    pub fn target_lane(&self) -> usize {
        self.target_lane
    }

    /// Rewrites the target lane index after lanes are inserted or removed.
    pub fn retarget(&mut self, lane: usize) {
        self.target_lane = lane;
    }

    /// Progress through the transition in [0, 1].
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Advances the transition and samples the pose from the curve.
    pub fn advance(&mut self, dt: f64, vel: f64) -> TransitionStep {
        let dp = match self.pacing {
            LaneChangePacing::ByDistance => vel * dt / f64::max(self.total_length, EPSILON),
            LaneChangePacing::ByDuration(duration) => dt / f64::max(duration, EPSILON),
        };
        self.progress = f64::min(self.progress + dp, 1.0);

        let t = match self.pacing {
            LaneChangePacing::ByDistance => self.param_at(self.progress * self.total_length),
            LaneChangePacing::ByDuration(_) => self.progress,
        };
        let commit =
            (self.progress >= 1.0 - COMPLETE_EPSILON).then_some((self.target_lane, self.end_pos));
        TransitionStep {
            point: self.curve.sample(t),
            tangent: safe_normalize(self.curve.sample_dt(t)),
            commit,
        }
    }

    /// Inverts an arc distance along the curve into the curve parameter.
    fn param_at(&self, dist: f64) -> f64 {
        if self.total_length < EPSILON {
            return 1.0;
        }
        let step = 1.0 / (ARC_SAMPLES - 1) as f64;
        for (i, (a, b)) in self.arc_lengths.iter().tuple_windows().enumerate() {
            if dist <= *b {
                let span = f64::max(b - a, EPSILON);
                return (i as f64 + (dist - a) / span) * step;
            }
        }
        1.0
    }
}

/// Checks whether the given vehicle can merge into the target lane at
/// `merge_pos`, reading the lane's current front and back neighbours as a
/// best-effort snapshot.
pub(crate) fn is_lane_change_safe(
    vehicle: &Vehicle,
    target: &Lane,
    vehicles: &VehicleSet,
    merge_pos: f64,
) -> LaneChangeCheck {
    let front = target.front_of(merge_pos, vehicles);
    let back = target.back_of(merge_pos, vehicles);

    let front_required =
        vehicle.distance_gap() + vehicle.time_headway() * vehicle.vel() + vehicle.length();
    let front_clear = front.map_or(true, |(_, dist)| dist > front_required);

    let back_clear = back.map_or(true, |(id, dist)| {
        let follower = &vehicles[id];
        let required = vehicle.half_length()
            + follower.distance_gap()
            + follower.time_headway() * follower.vel()
            + follower.length();
        dist > required
    });

    let maintain_speed = front.map_or(true, |(id, _)| {
        vehicle.vel() - vehicles[id].vel() <= MAINTAIN_SPEED_TOLERANCE
    });

    LaneChangeCheck {
        allowed: front_clear && back_clear,
        maintain_speed,
    }
}

/// Builds the transition curve carrying `vehicle` from its position on
/// `source` to a point `travel` metres ahead on `target`.
pub(crate) fn build_transition(
    vehicle: &Vehicle,
    source: &Lane,
    target: &Lane,
    target_lane: usize,
    travel: f64,
    pacing: LaneChangePacing,
    retain_speed: bool,
) -> LaneChange {
    let src_len = source.length();
    let dst_len = target.length();

    // Project the vehicle's position onto the target lane by relative arc position
    let proj = if src_len > EPSILON {
        vehicle.pos() / src_len * dst_len
    } else {
        0.0
    };
    let end_pos = if target.is_closed() {
        wrap_position(proj + travel, dst_len)
    } else {
        f64::min(proj + travel, dst_len)
    };

    let s0 = source.path().sample(vehicle.pos());
    let s1 = target.path().sample(end_pos);

    // Control offsets scale with roughly half the forward travel, bounded
    // below by the vehicle length and above by a fraction of the target lane
    let scale = f64::max(
        vehicle.length(),
        f64::min(0.5 * travel, MAX_CONTROL_FRACTION * dst_len),
    );
    let chord = safe_normalize(s1.point - s0.point);
    let c1 = s0.point + scale * safe_normalize(s0.tangent.lerp(chord, CHORD_BLEND));
    let c2 = s1.point - scale * safe_normalize(s1.tangent.lerp(chord, CHORD_BLEND));
    let curve = CubicBezier3d::new(&[s0.point, c1, c2, s1.point]);
    crate::debug::debug_transition("lane change", &curve);

    LaneChange::new(
        target_lane,
        end_pos,
        curve,
        pacing,
        retain_speed.then(|| vehicle.vel()),
    )
}
