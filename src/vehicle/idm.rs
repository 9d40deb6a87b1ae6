use crate::math::EPSILON;
use std::cell::Cell;

/// The car-following model of a vehicle, based on the intelligent driver model.
#[derive(Clone, Debug)]
pub struct IdmModel {
    max_vel: f64,
    max_acc: f64,
    comf_dec: f64,
    headway: f64,
    min_gap: f64,
    distance_gap: f64,
    vel_adj: f64,
    acc: Cell<f64>,
}

/// The parameters of the car-following model.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModelParams {
    /// The desired maximum speed in m/s.
    pub max_speed: f64,
    /// The vehicle's maximum acceleration in m/s<sup>2</sup>.
    pub max_acceleration: f64,
    /// The comfortable deceleration, a positive number in m/s<sup>2</sup>.
    pub comf_deceleration: f64,
    /// The desired time gap to the vehicle ahead in seconds.
    pub time_headway: f64,
    /// The gap below which the interaction term saturates, in m.
    pub min_gap: f64,
    /// The distance component of the desired gap in m.
    pub distance_gap: f64,
}

impl IdmModel {
    /// Creates a new car-following model.
    /// Non-positive parameters are floored so the model can never divide by zero.
    pub fn new(params: &ModelParams) -> Self {
        IdmModel {
            max_vel: f64::max(params.max_speed, EPSILON),
            max_acc: f64::max(params.max_acceleration, EPSILON),
            comf_dec: f64::max(params.comf_deceleration, EPSILON),
            headway: f64::max(params.time_headway, 0.0),
            min_gap: f64::max(params.min_gap, 0.0),
            distance_gap: f64::max(params.distance_gap, 0.0),
            vel_adj: 1.0,
            acc: Cell::new(0.0),
        }
    }

    /// The desired maximum speed in m/s.
    pub fn max_vel(&self) -> f64 {
        self.max_vel
    }

    /// The desired time gap to the vehicle ahead in seconds.
    pub fn headway(&self) -> f64 {
        self.headway
    }

    /// The distance component of the desired gap in m.
    pub fn distance_gap(&self) -> f64 {
        self.distance_gap
    }

    /// Set the desired velocity adjustment factor, a scalar which is
    /// multiplied with the maximum speed when computing the free road term.
    pub fn set_velocity_adjust(&mut self, factor: f64) {
        self.vel_adj = factor;
    }

    /// Updates the maximum speed. Non-positive values are ignored.
    pub fn set_max_speed(&mut self, value: f64) {
        if value > 0.0 {
            self.max_vel = value;
        }
    }

    /// Updates the maximum acceleration. Non-positive values are ignored.
    pub fn set_max_acceleration(&mut self, value: f64) {
        if value > 0.0 {
            self.max_acc = value;
        }
    }

    /// Updates the comfortable deceleration. Non-positive values are ignored.
    pub fn set_comf_deceleration(&mut self, value: f64) {
        if value > 0.0 {
            self.comf_dec = value;
        }
    }

    /// Updates the time headway. Negative values are ignored.
    pub fn set_time_headway(&mut self, value: f64) {
        if value >= 0.0 {
            self.headway = value;
        }
    }

    /// Updates the minimum gap. Negative values are ignored.
    pub fn set_min_gap(&mut self, value: f64) {
        if value >= 0.0 {
            self.min_gap = value;
        }
    }

    /// Updates the distance gap. Negative values are ignored.
    pub fn set_distance_gap(&mut self, value: f64) {
        if value >= 0.0 {
            self.distance_gap = value;
        }
    }

    /// Gets the acceleration computed by the most recent follow/hold call.
    pub fn acc(&self) -> f64 {
        self.acc.get()
    }

    /// Stores the acceleration for following the vehicle ahead,
    /// to be applied during the integration phase.
    pub fn follow(&self, gap: f64, delta_vel: f64, vel: f64) {
        self.acc.set(self.acceleration(gap, delta_vel, vel));
    }

    /// Stores a zero acceleration, holding the current speed.
    pub fn hold(&self) {
        self.acc.set(0.0);
    }

    /// Computes an acceleration using the intelligent driver model.
    ///
    /// # Arguments
    /// * `gap` - The bumper-to-bumper distance to the vehicle ahead in m;
    ///   infinite when the road ahead is free.
    /// * `delta_vel` - Own speed minus the leader's speed in m/s.
    /// * `vel` - Own speed in m/s.
    pub fn acceleration(&self, gap: f64, delta_vel: f64, vel: f64) -> f64 {
        let v0 = f64::max(self.vel_adj * self.max_vel, EPSILON);
        let free_road = (vel / v0).powi(4);

        let interaction = if gap.is_finite() {
            let mut desired = f64::max(self.min_gap, self.distance_gap + vel * self.headway);
            if delta_vel > 0.0 {
                let braking = vel * delta_vel / (2.0 * (self.max_acc * self.comf_dec).sqrt());
                desired += f64::max(0.0, braking);
            }
            let term = desired / f64::max(f64::max(self.min_gap, gap), EPSILON);
            term * term
        } else {
            0.0
        };

        self.max_acc * (1.0 - free_road - interaction)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn model() -> IdmModel {
        IdmModel::new(&ModelParams {
            max_speed: 20.0,
            max_acceleration: 2.0,
            comf_deceleration: 3.0,
            time_headway: 1.5,
            min_gap: 2.0,
            distance_gap: 2.0,
        })
    }

    #[test]
    fn free_road_from_standstill() {
        let idm = model();
        assert_approx_eq!(idm.acceleration(f64::INFINITY, 0.0, 0.0), 2.0);
    }

    #[test]
    fn free_road_at_max_speed() {
        let idm = model();
        assert_approx_eq!(idm.acceleration(f64::INFINITY, 0.0, 20.0), 0.0);
    }

    #[test]
    fn closing_on_leader_brakes() {
        let idm = model();
        let acc = idm.acceleration(10.0, 5.0, 15.0);
        assert!(acc < 0.0);
    }

    #[test]
    fn receding_leader_ignores_braking_term() {
        let idm = model();
        // A leader pulling away must not add a braking component.
        let steady = idm.acceleration(50.0, 0.0, 10.0);
        let opening = idm.acceleration(50.0, -5.0, 10.0);
        assert_approx_eq!(steady, opening);
    }

    #[test]
    fn zero_gap_saturates_at_min_gap() {
        let idm = model();
        let at_zero = idm.acceleration(0.0, 0.0, 10.0);
        let at_min = idm.acceleration(2.0, 0.0, 10.0);
        assert_approx_eq!(at_zero, at_min);
    }

    #[test]
    fn invalid_setter_values_are_ignored() {
        let mut idm = model();
        idm.set_max_speed(-5.0);
        assert_approx_eq!(idm.max_vel(), 20.0);
        idm.set_max_speed(25.0);
        assert_approx_eq!(idm.max_vel(), 25.0);
        idm.set_time_headway(-1.0);
        assert_approx_eq!(idm.headway(), 1.5);
    }
}
