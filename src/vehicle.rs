use self::idm::{IdmModel, ModelParams};
use crate::lane::LanePath;
use crate::lane_change::{LaneChange, MergeCommit};
use crate::math::{orientation_from_tangent, Point3d, Quat, Vector3d};
use crate::util::wrap_position;
use crate::VehicleId;
use rand::Rng;

mod idm;

/// The damping factor blending a vehicle's orientation toward the path
/// tangent each tick. A smoothing filter, not part of the physical model.
const ORIENTATION_DAMPING: f64 = 0.2;

/// The interval between autonomous lane change attempts, in s.
const LANE_CHANGE_INTERVAL: std::ops::Range<f64> = 3.0..8.0;

/// A simulated vehicle.
#[derive(Clone, Debug)]
pub struct Vehicle {
    /// The vehicle's ID
    pub(crate) id: VehicleId,
    /// Half the vehicle's width in m.
    half_wid: f64,
    /// Half the vehicle's length in m.
    half_len: f64,
    /// The vehicle's height in m.
    height: f64,
    /// The car-following model
    idm: IdmModel,
    /// The longitudinal position along the current lane, in m.
    pos: f64,
    /// The velocity in m/s.
    vel: f64,
    /// The acceleration applied by the most recent tick, in m/s^2.
    acc: f64,
    /// The lateral index of the lane the vehicle is on.
    lane: usize,
    /// Whether the vehicle is driving normally or merging into another lane.
    motion: Motion,
    /// Time since the last autonomous lane change attempt, in s.
    lc_timer: f64,
    /// Time until the next autonomous lane change attempt, in s.
    /// Zero until the first interval has been drawn.
    lc_interval: f64,
    /// The world space coordinates of the centre of the vehicle.
    world_pos: Point3d,
    /// The vehicle's orientation in world space.
    orientation: Quat,
    /// Whether the orientation has been initialised from the path tangent.
    oriented: bool,
    /// Whether the vehicle has reached the end of an open lane.
    exited: bool,
}

/// The attributes of a simulated vehicle.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VehicleAttributes {
    /// The vehicle width in m.
    pub width: f64,
    /// The vehicle length in m.
    pub length: f64,
    /// The vehicle height in m.
    pub height: f64,
    /// The desired maximum speed in m/s.
    pub max_speed: f64,
    /// The maximum acceleration of the vehicle, in m/s^2.
    pub max_acceleration: f64,
    /// The comfortable deceleration, a positive number in m/s^2.
    pub comf_deceleration: f64,
    /// The desired time gap to the vehicle ahead in seconds.
    pub time_headway: f64,
    /// The gap below which the car-following model saturates, in m.
    pub min_gap: f64,
    /// The distance component of the desired gap in m.
    pub distance_gap: f64,
}

/// Whether a vehicle is driving along its lane or merging into another.
#[derive(Clone, Debug)]
pub(crate) enum Motion {
    Driving,
    Merging(LaneChange),
}

/// The externally visible state of a vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VehicleState {
    Driving,
    Merging,
}

impl Vehicle {
    /// Creates a new vehicle on the lane with the given lateral index.
    pub(crate) fn new(id: VehicleId, attributes: &VehicleAttributes, lane: usize) -> Self {
        Self {
            id,
            half_wid: 0.5 * attributes.width,
            half_len: 0.5 * attributes.length,
            height: attributes.height,
            idm: IdmModel::new(&ModelParams {
                max_speed: attributes.max_speed,
                max_acceleration: attributes.max_acceleration,
                comf_deceleration: attributes.comf_deceleration,
                time_headway: attributes.time_headway,
                min_gap: attributes.min_gap,
                distance_gap: attributes.distance_gap,
            }),
            pos: 0.0,
            vel: 0.0,
            acc: 0.0,
            lane,
            motion: Motion::Driving,
            lc_timer: 0.0,
            lc_interval: 0.0,
            world_pos: Point3d::new(0.0, 0.0, 0.0),
            orientation: Quat::new(1.0, 0.0, 0.0, 0.0),
            oriented: false,
            exited: false,
        }
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// The vehicle's width in m.
    pub fn width(&self) -> f64 {
        2.0 * self.half_wid
    }

    /// The vehicle's length in m.
    pub fn length(&self) -> f64 {
        2.0 * self.half_len
    }

    /// Half the vehicle's length in m.
    pub fn half_length(&self) -> f64 {
        self.half_len
    }

    /// The vehicle's height in m.
    pub fn height(&self) -> f64 {
        self.height
    }

    /// The lateral index of the lane the vehicle is on.
    /// While merging, this is the source lane.
    pub fn lane(&self) -> usize {
        self.lane
    }

    /// The longitudinal position of the centre of the vehicle in m.
    pub fn pos(&self) -> f64 {
        self.pos
    }

    /// The vehicle's velocity in m/s.
    pub fn vel(&self) -> f64 {
        self.vel
    }

    /// The acceleration applied by the most recent tick, in m/s^2.
    pub fn acceleration(&self) -> f64 {
        self.acc
    }

    /// The desired maximum speed in m/s.
    pub fn max_speed(&self) -> f64 {
        self.idm.max_vel()
    }

    /// The desired time gap to the vehicle ahead in seconds.
    pub fn time_headway(&self) -> f64 {
        self.idm.headway()
    }

    /// The distance component of the desired gap in m.
    pub fn distance_gap(&self) -> f64 {
        self.idm.distance_gap()
    }

    /// Whether the vehicle is stopped.
    pub fn has_stopped(&self) -> bool {
        self.vel < 0.1
    }

    /// The coordinates in world space of the centre of the vehicle.
    pub fn position(&self) -> Point3d {
        self.world_pos
    }

    /// The vehicle's orientation in world space.
    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    /// The externally visible state of the vehicle.
    pub fn state(&self) -> VehicleState {
        match self.motion {
            Motion::Driving => VehicleState::Driving,
            Motion::Merging(_) => VehicleState::Merging,
        }
    }

    /// Whether a lane change is in progress.
    pub fn is_merging(&self) -> bool {
        matches!(self.motion, Motion::Merging(_))
    }

    /// Progress through the in-progress lane change in [0, 1], if any.
    pub fn merge_progress(&self) -> Option<f64> {
        match &self.motion {
            Motion::Merging(lc) => Some(lc.progress()),
            Motion::Driving => None,
        }
    }

    /// Updates the vehicle length. Non-positive values are ignored.
    pub fn set_length(&mut self, value: f64) {
        if value > 0.0 {
            self.half_len = 0.5 * value;
        }
    }

    /// Updates the vehicle width. Non-positive values are ignored.
    pub fn set_width(&mut self, value: f64) {
        if value > 0.0 {
            self.half_wid = 0.5 * value;
        }
    }

    /// Updates the vehicle height. Non-positive values are ignored.
    pub fn set_height(&mut self, value: f64) {
        if value > 0.0 {
            self.height = value;
        }
    }

    /// Updates the maximum speed. Non-positive values are ignored.
    pub fn set_max_speed(&mut self, value: f64) {
        self.idm.set_max_speed(value);
    }

    /// Updates the maximum acceleration. Non-positive values are ignored.
    pub fn set_max_acceleration(&mut self, value: f64) {
        self.idm.set_max_acceleration(value);
    }

    /// Updates the comfortable deceleration. Non-positive values are ignored.
    pub fn set_comf_deceleration(&mut self, value: f64) {
        self.idm.set_comf_deceleration(value);
    }

    /// Updates the time headway. Negative values are ignored.
    pub fn set_time_headway(&mut self, value: f64) {
        self.idm.set_time_headway(value);
    }

    /// Updates the minimum gap. Negative values are ignored.
    pub fn set_min_gap(&mut self, value: f64) {
        self.idm.set_min_gap(value);
    }

    /// Updates the distance gap. Negative values are ignored.
    pub fn set_distance_gap(&mut self, value: f64) {
        self.idm.set_distance_gap(value);
    }

    /// Set the desired velocity adjustment factor for the vehicle, a scalar
    /// which is multiplied with the maximum speed when computing the free
    /// road term of the car-following model.
    pub fn set_velocity_adjust(&mut self, factor: f64) {
        self.idm.set_velocity_adjust(factor);
    }

    /// The speed frozen by an in-progress retain-speed lane change.
    fn retained_vel(&self) -> Option<f64> {
        match &self.motion {
            Motion::Merging(lc) => lc.retained_vel(),
            Motion::Driving => None,
        }
    }

    /// Computes and stores the acceleration for this tick without applying it.
    ///
    /// # Arguments
    /// * `gap` - The bumper-to-bumper distance to the vehicle ahead in m;
    ///   infinite when the lane ahead is free.
    /// * `delta_vel` - Own speed minus the leader's speed in m/s.
    pub(crate) fn compute_acceleration(&self, gap: f64, delta_vel: f64) {
        if self.retained_vel().is_some() {
            self.idm.hold();
        } else {
            self.idm.follow(gap, delta_vel, self.vel);
        }
    }

    /// Integrates the vehicle's velocity and position along the lane path.
    ///
    /// # Arguments
    /// * `dt` - The time step in seconds
    /// * `path` - The path of the lane the vehicle is on
    pub(crate) fn integrate(&mut self, dt: f64, path: &LanePath) {
        let acc = self.idm.acc();
        self.acc = acc;

        let vel = match self.retained_vel() {
            Some(frozen) => frozen,
            None => (self.vel + acc * dt).clamp(0.0, self.idm.max_vel()),
        };
        self.vel = vel;

        let pos = self.pos + vel * dt;
        if path.closed() {
            self.pos = wrap_position(pos, path.length());
        } else if pos >= path.length() {
            self.pos = path.length();
            self.exited = true;
        } else {
            self.pos = pos;
        }

        // While merging, the pose is read from the transition curve instead.
        if !self.is_merging() {
            self.update_pose(path);
        }
    }

    /// Whether the vehicle has reached the end of an open lane.
    pub(crate) fn has_exited(&self) -> bool {
        self.exited
    }

    /// Re-normalizes the position after a change to the lane path's length.
    pub(crate) fn normalize_position(&mut self, path: &LanePath) {
        if path.closed() {
            self.pos = wrap_position(self.pos, path.length());
        } else if self.pos > path.length() {
            self.pos = path.length();
            self.exited = true;
        }
    }

    /// Updates the vehicle's world pose from the lane path.
    pub(crate) fn update_pose(&mut self, path: &LanePath) {
        let sample = path.sample(self.pos);
        self.update_pose_to(sample.point, sample.tangent);
    }

    /// Moves the world pose to `point`, blending the orientation toward `tangent`.
    fn update_pose_to(&mut self, point: Point3d, tangent: Vector3d) {
        let target = orientation_from_tangent(tangent);
        self.orientation = if self.oriented {
            self.orientation.slerp(target, ORIENTATION_DAMPING)
        } else {
            self.oriented = true;
            target
        };
        self.world_pos = point;
    }

    /// Moves the vehicle to a new lane and position, used at initial
    /// placement and when a lane change commits.
    pub(crate) fn set_location(&mut self, lane: usize, pos: f64, path: &LanePath) {
        self.lane = lane;
        self.pos = wrap_position(pos, path.length());
        self.update_pose(path);
    }

    /// Re-derives the stored lane indices after a lane was inserted at `at`.
    pub(crate) fn shift_lanes_on_insert(&mut self, at: usize) {
        if self.lane >= at {
            self.lane += 1;
        }
        if let Motion::Merging(lc) = &mut self.motion {
            if lc.target_lane() >= at {
                lc.retarget(lc.target_lane() + 1);
            }
        }
    }

    /// Re-derives the stored lane indices after the lane at `at` was
    /// removed. A transition targeting the removed lane is cancelled.
    pub(crate) fn shift_lanes_on_removal(&mut self, at: usize) {
        if self.lane > at {
            self.lane -= 1;
        }
        if let Motion::Merging(lc) = &mut self.motion {
            let target = lc.target_lane();
            if target == at {
                self.motion = Motion::Driving;
            } else if target > at {
                lc.retarget(target - 1);
            }
        }
    }

    /// Starts a lane change transition. No-op if one is already in progress.
    pub(crate) fn begin_merge(&mut self, lane_change: LaneChange) {
        if let Motion::Driving = self.motion {
            self.motion = Motion::Merging(lane_change);
        }
    }

    /// Advances an in-progress lane change and updates the pose from the
    /// transition curve. Returns the commit when the transition completes.
    pub(crate) fn advance_merge(&mut self, dt: f64) -> Option<MergeCommit> {
        let vel = self.vel;
        let step = match &mut self.motion {
            Motion::Merging(lc) => lc.advance(dt, vel),
            Motion::Driving => return None,
        };
        self.update_pose_to(step.point, step.tangent);

        let (to_lane, pos) = step.commit?;
        let from_lane = self.lane;
        self.lane = to_lane;
        self.pos = pos;
        self.motion = Motion::Driving;
        Some(MergeCommit {
            from_lane,
            to_lane,
            pos,
        })
    }

    /// Advances the autonomous lane change clock. Returns `true` when an
    /// attempt is due.
    pub(crate) fn tick_lane_change_clock(&mut self, dt: f64, rng: &mut impl Rng) -> bool {
        if self.lc_interval <= 0.0 {
            self.lc_interval = rng.gen_range(LANE_CHANGE_INTERVAL);
            return false;
        }
        self.lc_timer += dt;
        if self.lc_timer >= self.lc_interval {
            self.lc_timer = 0.0;
            self.lc_interval = rng.gen_range(LANE_CHANGE_INTERVAL);
            true
        } else {
            false
        }
    }
}
