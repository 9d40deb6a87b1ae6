pub use cgmath;
pub use lane::{Lane, LaneAttributes, LanePath, PathSample};
pub use lane_change::{LaneChangeCheck, LaneChangePacing};
pub use road::{Road, RoadError};
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use util::Interval;
pub use vehicle::{Vehicle, VehicleAttributes, VehicleState};

mod debug;
mod lane;
mod lane_change;
pub mod math;
mod road;
mod util;
mod vehicle;

new_key_type! {
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
}

type VehicleSet = SlotMap<VehicleId, Vehicle>;
