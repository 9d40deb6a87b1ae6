use crate::lane::{Lane, LaneAttributes};
use crate::lane_change::{self, LaneChangeCheck, LaneChangePacing};
use crate::math::EPSILON;
use crate::vehicle::{Vehicle, VehicleAttributes};
use crate::{VehicleId, VehicleSet};
use rand::Rng;
use rand_distr::Distribution;
use thiserror::Error;

/// The smallest forward travel of an autonomous lane change, in m.
const MIN_MERGE_TRAVEL: f64 = 10.0;

/// Seconds of travel at the current speed covered by an autonomous merge.
const MERGE_TRAVEL_TIME: f64 = 2.0;

/// An error raised by a road operation.
#[derive(Debug, Error)]
pub enum RoadError {
    /// The lane index does not resolve to a lane on this road.
    #[error("lane index {0} is out of range")]
    LaneOutOfRange(usize),
    /// The vehicle is not (or no longer) part of the simulation.
    #[error("vehicle is not in the simulation")]
    UnknownVehicle,
}

/// A road: an ordered collection of lanes, index 0 being the left-most,
/// and the vehicles travelling on them.
#[derive(Default)]
pub struct Road {
    /// The lanes, ordered left to right.
    lanes: Vec<Lane>,
    /// The vehicles being simulated.
    vehicles: VehicleSet,
    /// The current frame of simulation.
    frame: usize,
    /// Debugging information from the previously simulated frame.
    #[cfg(feature = "debug")]
    debug: serde_json::Value,
}

impl Road {
    /// Creates a new road with no lanes.
    pub fn new() -> Self {
        Default::default()
    }

    /// Appends a lane at the right-most position, returning its index.
    pub fn add_lane(&mut self, attribs: &LaneAttributes) -> usize {
        self.lanes.push(Lane::new(attribs));
        self.lanes.len() - 1
    }

    /// Inserts a lane at the given lateral index, shifting lanes at and
    /// to the right of it. The stored lane index of every affected vehicle
    /// is re-derived.
    pub fn insert_lane(&mut self, attribs: &LaneAttributes, index: usize) -> Result<(), RoadError> {
        if index > self.lanes.len() {
            return Err(RoadError::LaneOutOfRange(index));
        }
        self.lanes.insert(index, Lane::new(attribs));
        for (_, vehicle) in &mut self.vehicles {
            vehicle.shift_lanes_on_insert(index);
        }
        Ok(())
    }

    /// Removes the lane at the given index along with its vehicles.
    /// The stored lane index of every remaining vehicle is re-derived, and
    /// transitions targeting the removed lane are cancelled.
    pub fn remove_lane(&mut self, index: usize) -> Result<(), RoadError> {
        if index >= self.lanes.len() {
            return Err(RoadError::LaneOutOfRange(index));
        }
        let lane = self.lanes.remove(index);
        for id in lane.iter_vehicles() {
            self.vehicles.remove(id);
            log::debug!("removed vehicle {:?} with lane {}", id, index);
        }
        for (_, vehicle) in &mut self.vehicles {
            vehicle.shift_lanes_on_removal(index);
        }
        Ok(())
    }

    /// Gets the lane at the given lateral index.
    pub fn lane(&self, index: usize) -> Option<&Lane> {
        self.lanes.get(index)
    }

    /// Gets a mutable reference to the lane at the given lateral index.
    pub fn lane_mut(&mut self, index: usize) -> Option<&mut Lane> {
        self.lanes.get_mut(index)
    }

    /// The number of lanes on the road.
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Returns an iterator over the lanes, left to right.
    pub fn iter_lanes(&self) -> impl Iterator<Item = &Lane> {
        self.lanes.iter()
    }

    /// Adds a vehicle to the simulation at the given position along a lane.
    /// Fails when the lane index does not resolve, since a vehicle without
    /// geometry cannot compute its pose.
    pub fn add_vehicle(
        &mut self,
        attributes: &VehicleAttributes,
        lane: usize,
        pos: f64,
    ) -> Result<VehicleId, RoadError> {
        let path = self
            .lanes
            .get(lane)
            .ok_or(RoadError::LaneOutOfRange(lane))?
            .path();
        let vehicle_id = self.vehicles.insert_with_key(|id| {
            let mut vehicle = Vehicle::new(id, attributes, lane);
            vehicle.set_location(lane, pos, path);
            vehicle
        });
        self.lanes[lane].insert_vehicle(&self.vehicles, vehicle_id);
        log::debug!("added vehicle {:?} to lane {}", vehicle_id, lane);
        Ok(vehicle_id)
    }

    /// Removes a vehicle from the simulation.
    pub fn remove_vehicle(&mut self, id: VehicleId) {
        if let Some(vehicle) = self.vehicles.remove(id) {
            if let Some(lane) = self.lanes.get_mut(vehicle.lane()) {
                lane.remove_vehicle(id);
            }
        }
    }

    /// Gets a reference to the vehicle with the given ID.
    pub fn get_vehicle(&self, id: VehicleId) -> &Vehicle {
        &self.vehicles[id]
    }

    /// Gets a mutable reference to the vehicle with the given ID,
    /// for live adjustment of its behaviour parameters.
    pub fn get_vehicle_mut(&mut self, id: VehicleId) -> &mut Vehicle {
        &mut self.vehicles[id]
    }

    /// Returns an iterator over all the vehicles in the simulation.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// Gets the current simulation frame index.
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Randomly assigns a desired velocity adjustment factor to each vehicle,
    /// which is sampled from a normal distribution with a mean of 1 (no
    /// adjustment) and standard deviation of `stddev`.
    pub fn randomize_speed_adjusts(&mut self, stddev: f64) {
        let mut rand = rand::thread_rng();
        let distr = rand_distr::Normal::new(1.0, stddev).expect("Invalid standard deviation");
        for (_, vehicle) in &mut self.vehicles {
            let factor = distr.sample(&mut rand).clamp(0.75, 1.25);
            vehicle.set_velocity_adjust(factor);
        }
    }

    /// Advances the simulation by `dt` seconds.
    ///
    /// For a realistic simulation, do not use a time step greater than around 0.2.
    pub fn step(&mut self, dt: f64) {
        self.step_with_rng(dt, &mut rand::thread_rng());
    }

    /// Advances the simulation by `dt` seconds, drawing autonomous lane
    /// change decisions from the given source of randomness.
    pub fn step_with_rng(&mut self, dt: f64, rng: &mut impl Rng) {
        // Two-phase update of every lane
        let mut exited = Vec::new();
        for lane in &mut self.lanes {
            lane.update(dt, &mut self.vehicles, &mut exited);
        }

        // Vehicles that ran off the end of an open lane leave the simulation
        for id in exited {
            if let Some(vehicle) = self.vehicles.remove(id) {
                if let Some(lane) = self.lanes.get_mut(vehicle.lane()) {
                    lane.remove_vehicle(id);
                }
                log::trace!("vehicle {:?} exited at end of lane", id);
            }
        }

        // Advance in-progress transitions and commit completed ones
        let mut commits = Vec::new();
        for (id, vehicle) in &mut self.vehicles {
            if let Some(commit) = vehicle.advance_merge(dt) {
                commits.push((id, commit));
            }
        }
        for (id, commit) in commits {
            self.lanes[commit.from_lane].remove_vehicle(id);
            self.lanes[commit.to_lane].insert_vehicle(&self.vehicles, id);
            crate::debug::debug_marker("merge commit", self.vehicles[id].position());
            log::debug!(
                "vehicle {:?} merged into lane {} at {:.1} m",
                id,
                commit.to_lane,
                commit.pos
            );
        }

        // Autonomous lane change attempts
        let mut due = Vec::new();
        for (id, vehicle) in &mut self.vehicles {
            if vehicle.tick_lane_change_clock(dt, rng) {
                due.push(id);
            }
        }
        for id in due {
            self.attempt_autonomous_change(id, rng);
        }

        self.frame += 1;

        #[cfg(feature = "debug")]
        {
            self.debug = crate::debug::take_debug_frame();
        }
    }

    /// Causes the given vehicle to change into the target lane, smoothly
    /// transitioning over `travel` metres of forward progress.
    /// A no-op when a lane change is already in progress.
    pub fn start_lane_change(
        &mut self,
        id: VehicleId,
        target_lane: usize,
        travel: f64,
        pacing: LaneChangePacing,
        retain_speed: bool,
    ) -> Result<(), RoadError> {
        if target_lane >= self.lanes.len() {
            return Err(RoadError::LaneOutOfRange(target_lane));
        }
        let vehicle = self
            .vehicles
            .get(id)
            .ok_or(RoadError::UnknownVehicle)?;
        if vehicle.is_merging() {
            return Ok(());
        }
        self.begin_lane_change(id, target_lane, travel, pacing, retain_speed);
        Ok(())
    }

    /// Checks whether the given vehicle could merge into the target lane
    /// right now. Neighbour distances are a best-effort snapshot of the
    /// target lane's current state.
    pub fn check_lane_change(
        &self,
        id: VehicleId,
        target_lane: usize,
    ) -> Result<LaneChangeCheck, RoadError> {
        let target = self
            .lanes
            .get(target_lane)
            .ok_or(RoadError::LaneOutOfRange(target_lane))?;
        let vehicle = self
            .vehicles
            .get(id)
            .ok_or(RoadError::UnknownVehicle)?;
        let source = &self.lanes[vehicle.lane()];
        let merge_pos = project_pos(vehicle.pos(), source.length(), target.length());
        Ok(lane_change::is_lane_change_safe(
            vehicle,
            target,
            &self.vehicles,
            merge_pos,
        ))
    }

    /// Gets the debugging information for the previously simulated frame as JSON array.
    #[cfg(feature = "debug")]
    pub fn debug(&mut self) -> serde_json::Value {
        self.debug.clone()
    }

    /// Builds and installs the transition for a vehicle known to exist.
    fn begin_lane_change(
        &mut self,
        id: VehicleId,
        target_lane: usize,
        travel: f64,
        pacing: LaneChangePacing,
        retain_speed: bool,
    ) {
        let vehicle = &self.vehicles[id];
        let lane_change = lane_change::build_transition(
            vehicle,
            &self.lanes[vehicle.lane()],
            &self.lanes[target_lane],
            target_lane,
            travel,
            pacing,
            retain_speed,
        );
        log::debug!(
            "vehicle {:?} merging from lane {} into lane {}",
            id,
            vehicle.lane(),
            target_lane
        );
        self.vehicles[id].begin_merge(lane_change);
    }

    /// Attempts an autonomous lane change into a random adjacent lane.
    fn attempt_autonomous_change(&mut self, id: VehicleId, rng: &mut impl Rng) {
        let vehicle = match self.vehicles.get(id) {
            Some(vehicle) => vehicle,
            None => return,
        };
        if vehicle.is_merging() {
            return;
        }

        let lane = vehicle.lane();
        let target = if rng.gen_bool(0.5) {
            lane.checked_sub(1)
        } else {
            (lane + 1 < self.lanes.len()).then_some(lane + 1)
        };
        let target = match target {
            Some(target) => target,
            None => return,
        };

        let source = &self.lanes[lane];
        let merge_pos = project_pos(vehicle.pos(), source.length(), self.lanes[target].length());
        let check =
            lane_change::is_lane_change_safe(vehicle, &self.lanes[target], &self.vehicles, merge_pos);
        if !check.allowed {
            log::trace!("vehicle {:?} denied merge into lane {}", id, target);
            return;
        }

        let travel = f64::max(MIN_MERGE_TRAVEL, MERGE_TRAVEL_TIME * vehicle.vel());
        self.begin_lane_change(
            id,
            target,
            travel,
            LaneChangePacing::ByDistance,
            check.maintain_speed,
        );
    }
}

/// Maps a position on one lane onto another by relative arc position.
fn project_pos(pos: f64, src_len: f64, dst_len: f64) -> f64 {
    if src_len > EPSILON {
        pos / src_len * dst_len
    } else {
        0.0
    }
}
