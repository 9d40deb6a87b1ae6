//! Tests that involve the simulation of a single lane.

use laneflow::{
    math::{ArcSegment3d, CatmullRomSpline3d, LineSegment3d, Point3d},
    LaneAttributes, Road, VehicleAttributes,
};

fn car() -> VehicleAttributes {
    VehicleAttributes {
        width: 2.0,
        length: 4.0,
        height: 1.5,
        max_speed: 16.0,
        max_acceleration: 2.0,
        comf_deceleration: 3.0,
        time_headway: 1.5,
        min_gap: 2.0,
        distance_gap: 2.0,
    }
}

/// A closed ring road with a single lane of roughly the given length.
fn ring_road(length: f64) -> Road {
    let circle = ArcSegment3d::circle(
        Point3d::new(0.0, 0.0, 0.0),
        length / std::f64::consts::TAU,
    );
    let mut road = Road::new();
    road.add_lane(&LaneAttributes {
        curve: &circle,
        closed: true,
    });
    road
}

/// Test that a lone vehicle accelerates monotonically up to its maximum speed.
#[test]
fn lone_vehicle_converges_to_max_speed() {
    let mut road = ring_road(300.0);
    let veh = road.add_vehicle(&car(), 0, 0.0).unwrap();

    let mut vel = road.get_vehicle(veh).vel();
    for _ in 0..600 {
        road.step(0.1);
        let next_vel = road.get_vehicle(veh).vel();
        if vel < 16.0 {
            assert!(next_vel >= vel, "speed decreased on a free road");
        }
        vel = next_vel;
    }
    assert!(vel > 15.9, "vehicle did not approach its maximum speed");
    assert!(vel <= 16.0);
}

/// Test that the integrated position always stays within [0, length).
#[test]
fn closed_lane_position_wraps() {
    let mut road = ring_road(100.0);
    let veh = road.add_vehicle(&car(), 0, 95.0).unwrap();
    let length = road.lane(0).unwrap().length();

    for _ in 0..3000 {
        road.step(0.1);
        let pos = road.get_vehicle(veh).pos();
        assert!(pos >= 0.0, "position went negative: {pos}");
        assert!(pos < length, "position escaped the lane: {pos} >= {length}");
    }
}

/// Test that the speed of every vehicle stays within [0, max_speed].
#[test]
fn speed_stays_bounded() {
    let mut road = ring_road(120.0);
    let mut slow = car();
    slow.max_speed = 5.0;
    road.add_vehicle(&slow, 0, 30.0).unwrap();
    road.add_vehicle(&car(), 0, 0.0).unwrap();

    for _ in 0..2000 {
        road.step(0.05);
        for vehicle in road.iter_vehicles() {
            assert!(vehicle.vel() >= 0.0);
            assert!(vehicle.vel() <= vehicle.max_speed() + 1e-9);
        }
    }
}

/// Test that a follower closing on a slower leader never passes through it.
#[test]
fn follower_never_passes_leader() {
    let mut road = ring_road(120.0);
    let mut slow = car();
    slow.max_speed = 5.0;
    let leader = road.add_vehicle(&slow, 0, 30.0).unwrap();
    let follower = road.add_vehicle(&car(), 0, 0.0).unwrap();
    let length = road.lane(0).unwrap().length();

    for _ in 0..4000 {
        road.step(0.05);
        let lead_pos = road.get_vehicle(leader).pos();
        let follow_pos = road.get_vehicle(follower).pos();
        let gap = (lead_pos - follow_pos).rem_euclid(length) - 4.0;
        assert!(gap >= 0.0, "follower passed through the leader: gap {gap}");
    }
}

/// Test that the two-phase update is independent of vehicle insertion order.
#[test]
fn tick_results_are_order_independent() {
    let positions = [10.0, 40.0, 70.0];

    let run = |order: &[usize]| -> Vec<f64> {
        let mut road = ring_road(100.0);
        for idx in order {
            road.add_vehicle(&car(), 0, positions[*idx]).unwrap();
        }
        for _ in 0..10 {
            road.step(0.1);
        }
        let mut out: Vec<f64> = road.iter_vehicles().map(|v| v.pos()).collect();
        out.sort_by(f64::total_cmp);
        out
    };

    let a = run(&[0, 1, 2]);
    let b = run(&[2, 0, 1]);
    let c = run(&[1, 2, 0]);
    for ((a, b), c) in a.iter().zip(&b).zip(&c) {
        assert!((a - b).abs() < 1e-9, "insertion order changed the result");
        assert!((a - c).abs() < 1e-9, "insertion order changed the result");
    }
}

/// Test that a vehicle reaching the end of an open lane leaves the simulation.
#[test]
fn open_lane_end_removes_vehicle() {
    let line = LineSegment3d::from_ends(Point3d::new(0.0, 0.0, 0.0), Point3d::new(100.0, 0.0, 0.0));
    let mut road = Road::new();
    road.add_lane(&LaneAttributes {
        curve: &line,
        closed: false,
    });
    road.add_vehicle(&car(), 0, 90.0).unwrap();

    for _ in 0..200 {
        road.step(0.1);
    }
    assert_eq!(road.iter_vehicles().count(), 0);
    assert_eq!(road.lane(0).unwrap().num_vehicles(), 0);
}

/// Test that a vehicle can drive a closed spline lane without leaving it.
#[test]
fn spline_ring_drives_smoothly() {
    let points: Vec<Point3d> = (0..8)
        .map(|i| {
            let a = i as f64 / 8.0 * std::f64::consts::TAU;
            Point3d::new(40.0 * a.cos(), 40.0 * a.sin(), 0.0)
        })
        .collect();
    let spline = CatmullRomSpline3d::new(points, true);
    let mut road = Road::new();
    road.add_lane(&LaneAttributes {
        curve: &spline,
        closed: true,
    });
    let veh = road.add_vehicle(&car(), 0, 0.0).unwrap();
    let length = road.lane(0).unwrap().length();
    assert!(length > 200.0, "spline ring came out too short: {length}");

    for _ in 0..1000 {
        road.step(0.1);
        let vehicle = road.get_vehicle(veh);
        assert!(vehicle.pos() >= 0.0 && vehicle.pos() < length);
        let p = vehicle.position();
        assert!(p.x.is_finite() && p.y.is_finite() && p.z.is_finite());
    }
}

/// Test that a vehicle's world pose follows the lane geometry.
#[test]
fn pose_tracks_the_path() {
    let mut road = ring_road(100.0);
    let radius = 100.0 / std::f64::consts::TAU;
    let veh = road.add_vehicle(&car(), 0, 0.0).unwrap();

    for _ in 0..500 {
        road.step(0.1);
        let p = road.get_vehicle(veh).position();
        let dist = (p.x * p.x + p.y * p.y).sqrt();
        assert!((dist - radius).abs() < 0.1, "vehicle left the ring: {dist}");
        assert!(p.x.is_finite() && p.y.is_finite() && p.z.is_finite());
    }
}
