use crate::math::ParametricCurve3d;
use crate::util::wrap_position;
use crate::{VehicleId, VehicleSet};
use itertools::Itertools;
use smallvec::SmallVec;

pub use path::{LanePath, PathSample};

mod path;

/// A lane represents a single stream of traffic along one path.
#[derive(Clone)]
pub struct Lane {
    /// The geometry of the lane.
    path: LanePath,
    /// Cached path length, refreshed at the start of each tick.
    total_length: f64,
    /// The vehicles on the lane, sorted by position each tick.
    vehicles: SmallVec<[VehicleId; 16]>,
}

/// The attributes of a lane.
pub struct LaneAttributes<'a> {
    /// A curve defining the centre line of the lane.
    pub curve: &'a dyn ParametricCurve3d,
    /// Whether the lane loops back on itself.
    pub closed: bool,
}

impl Lane {
    /// Creates a new lane.
    pub fn new(attribs: &LaneAttributes) -> Self {
        let path = LanePath::new(attribs.curve, attribs.closed);
        Self {
            total_length: path.length(),
            path,
            vehicles: SmallVec::new(),
        }
    }

    /// Gets the length of the lane in m.
    pub fn length(&self) -> f64 {
        self.path.length()
    }

    /// Whether the lane loops back on itself.
    pub fn is_closed(&self) -> bool {
        self.path.closed()
    }

    /// Gets the path representing the lane's centre line.
    pub fn path(&self) -> &LanePath {
        &self.path
    }

    /// Replaces the lane's geometry. Vehicle positions are re-normalized
    /// against the new length on the next tick.
    pub fn set_curve(&mut self, curve: &dyn ParametricCurve3d, closed: bool) {
        self.path = LanePath::new(curve, closed);
    }

    /// The number of vehicles on the lane.
    pub fn num_vehicles(&self) -> usize {
        self.vehicles.len()
    }

    /// Returns the vehicles on the lane in ascending order of position.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = VehicleId> + '_ {
        self.vehicles.iter().copied()
    }

    /// Inserts the vehicle with the given ID into the lane,
    /// keeping the lane's position ordering.
    pub(crate) fn insert_vehicle(&mut self, vehicles: &VehicleSet, id: VehicleId) {
        let veh_pos = vehicles[id].pos();
        let idx = self
            .vehicles
            .iter()
            .map(|id| vehicles[*id].pos())
            .position(|pos| pos > veh_pos)
            .unwrap_or(self.vehicles.len());
        self.vehicles.insert(idx, id);
    }

    /// Removes the vehicle with the given ID from the lane.
    pub(crate) fn remove_vehicle(&mut self, id: VehicleId) {
        if let Some(idx) = self.vehicles.iter().rposition(|v| *v == id) {
            self.vehicles.remove(idx);
        }
    }

    /// Advances the lane by one tick.
    ///
    /// Accelerations are computed for every vehicle from the pre-tick
    /// snapshot before any vehicle is integrated, so the update order of
    /// vehicles cannot affect the result. Vehicles that ran off the end of
    /// an open lane are appended to `exited`.
    pub(crate) fn update(&mut self, dt: f64, vehicles: &mut VehicleSet, exited: &mut Vec<VehicleId>) {
        if self.vehicles.is_empty() {
            return;
        }

        // The path may have been swapped since the last tick
        self.total_length = self.path.length();
        for id in &self.vehicles {
            vehicles[*id].normalize_position(&self.path);
        }

        // Sort by the prior tick's positions; adjacency is fixed for this tick
        self.vehicles
            .sort_by(|a, b| vehicles[*a].pos().total_cmp(&vehicles[*b].pos()));

        // Phase 1: compute every acceleration from the pre-tick snapshot
        if self.vehicles.len() == 1 {
            vehicles[self.vehicles[0]].compute_acceleration(f64::INFINITY, 0.0);
        } else if self.path.closed() {
            for (id, next) in self.vehicles.iter().circular_tuple_windows() {
                self.follow_leader(vehicles, *id, *next);
            }
        } else {
            for (id, next) in self.vehicles.iter().tuple_windows() {
                self.follow_leader(vehicles, *id, *next);
            }
            if let Some(last) = self.vehicles.last() {
                vehicles[*last].compute_acceleration(f64::INFINITY, 0.0);
            }
        }

        // Phase 2: integrate every vehicle
        for id in &self.vehicles {
            let vehicle = &mut vehicles[*id];
            vehicle.integrate(dt, &self.path);
            if vehicle.has_exited() {
                exited.push(*id);
            }
        }
    }

    /// Stores the acceleration for `id` following `next` ahead of it.
    fn follow_leader(&self, vehicles: &VehicleSet, id: VehicleId, next: VehicleId) {
        let vehicle = &vehicles[id];
        let leader = &vehicles[next];
        let centre_gap = wrap_position(leader.pos() - vehicle.pos(), self.total_length);
        let gap = centre_gap - (vehicle.half_length() + leader.half_length());
        vehicle.compute_acceleration(f64::max(gap, 0.0), vehicle.vel() - leader.vel());
    }

    /// Finds the vehicle ahead of the given position and its centre
    /// distance, wrapping around on closed lanes.
    pub(crate) fn front_of(&self, pos: f64, vehicles: &VehicleSet) -> Option<(VehicleId, f64)> {
        self.neighbour_of(pos, vehicles, |other, pos, length, closed| {
            let dist = other - pos;
            if closed {
                Some(wrap_position(dist, length))
            } else {
                (dist >= 0.0).then_some(dist)
            }
        })
    }

    /// Finds the vehicle behind the given position and its centre
    /// distance, wrapping around on closed lanes.
    pub(crate) fn back_of(&self, pos: f64, vehicles: &VehicleSet) -> Option<(VehicleId, f64)> {
        self.neighbour_of(pos, vehicles, |other, pos, length, closed| {
            let dist = pos - other;
            if closed {
                Some(wrap_position(dist, length))
            } else {
                (dist >= 0.0).then_some(dist)
            }
        })
    }

    fn neighbour_of(
        &self,
        pos: f64,
        vehicles: &VehicleSet,
        dist: impl Fn(f64, f64, f64, bool) -> Option<f64>,
    ) -> Option<(VehicleId, f64)> {
        let length = self.path.length();
        let closed = self.path.closed();
        self.vehicles
            .iter()
            .filter_map(|id| {
                dist(vehicles[*id].pos(), pos, length, closed).map(|d| (*id, d))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}
