//! Tests for the lane change state machine and its safety gating.
//!
//! Stepped tests stay under 3 s of simulated time so the autonomous lane
//! change clock, which first fires after at least 3 s, cannot interfere.

use laneflow::{
    math::{LineSegment3d, Point3d},
    LaneAttributes, LaneChangePacing, Road, VehicleAttributes, VehicleState,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn car() -> VehicleAttributes {
    VehicleAttributes {
        width: 2.0,
        length: 4.0,
        height: 1.5,
        max_speed: 16.0,
        max_acceleration: 2.0,
        comf_deceleration: 3.0,
        time_headway: 1.0,
        min_gap: 2.0,
        distance_gap: 3.0,
    }
}

/// Two parallel straight lanes of 100 m, 3.5 m apart.
fn two_lane_road() -> Road {
    let mut road = Road::new();
    for i in 0..2 {
        let y = 3.5 * i as f64;
        let line =
            LineSegment3d::from_ends(Point3d::new(0.0, y, 0.0), Point3d::new(100.0, y, 0.0));
        road.add_lane(&LaneAttributes {
            curve: &line,
            closed: false,
        });
    }
    road
}

/// Test that completing a lane change commits the vehicle to the target lane
/// at the projected end position.
#[test]
fn lane_change_commits_to_target_lane() {
    let mut road = two_lane_road();
    let veh = road.add_vehicle(&car(), 0, 50.0).unwrap();

    // Get the vehicle moving before merging
    for _ in 0..10 {
        road.step(0.1);
    }
    road.start_lane_change(veh, 1, 10.0, LaneChangePacing::ByDuration(1.0), false)
        .unwrap();
    assert_eq!(road.get_vehicle(veh).state(), VehicleState::Merging);

    let mut committed = false;
    for _ in 0..15 {
        road.step(0.1);
        if road.get_vehicle(veh).state() == VehicleState::Driving {
            committed = true;
            break;
        }
    }
    assert!(committed, "lane change never completed");

    let vehicle = road.get_vehicle(veh);
    assert_eq!(vehicle.lane(), 1);
    // The commit lands at the merge start's projection plus the travel distance
    assert!(vehicle.pos() > 60.0 && vehicle.pos() < 65.0);
    assert_eq!(road.lane(1).unwrap().num_vehicles(), 1);
    assert_eq!(road.lane(0).unwrap().num_vehicles(), 0);
}

/// Test the worked safety example: a follower 1 m behind the merge point
/// with a 9 m requirement must block the lane change.
#[test]
fn safety_gate_rejects_close_follower() {
    let mut road = two_lane_road();
    let merger = road.add_vehicle(&car(), 0, 50.0).unwrap();
    // Follower on the target lane, 1 m behind the projected merge point
    road.add_vehicle(&car(), 1, 49.0).unwrap();

    let check = road.check_lane_change(merger, 1).unwrap();
    assert!(!check.allowed);
}

/// Test that a distant follower does not block the lane change.
#[test]
fn safety_gate_accepts_distant_follower() {
    let mut road = two_lane_road();
    let merger = road.add_vehicle(&car(), 0, 50.0).unwrap();
    road.add_vehicle(&car(), 1, 10.0).unwrap();

    let check = road.check_lane_change(merger, 1).unwrap();
    assert!(check.allowed);
    // No front neighbour, so the merge can keep its speed
    assert!(check.maintain_speed);
}

/// Test that a vehicle directly ahead of the merge point blocks the change.
#[test]
fn safety_gate_rejects_close_leader() {
    let mut road = two_lane_road();
    let merger = road.add_vehicle(&car(), 0, 50.0).unwrap();
    road.add_vehicle(&car(), 1, 52.0).unwrap();

    let check = road.check_lane_change(merger, 1).unwrap();
    assert!(!check.allowed);
}

/// Test that an empty target lane passes the safety check.
#[test]
fn safety_gate_accepts_empty_lane() {
    let mut road = two_lane_road();
    let merger = road.add_vehicle(&car(), 0, 50.0).unwrap();

    let check = road.check_lane_change(merger, 1).unwrap();
    assert!(check.allowed);
    assert!(check.maintain_speed);
}

/// Test that a retain-speed lane change freezes the vehicle's speed for
/// the duration of the transition.
#[test]
fn retained_speed_is_frozen_while_merging() {
    let mut road = two_lane_road();
    let veh = road.add_vehicle(&car(), 0, 10.0).unwrap();

    for _ in 0..10 {
        road.step(0.1);
    }
    let frozen = road.get_vehicle(veh).vel();
    assert!(frozen > 0.0);

    road.start_lane_change(veh, 1, 15.0, LaneChangePacing::ByDuration(1.0), true)
        .unwrap();
    for _ in 0..5 {
        road.step(0.1);
        let vehicle = road.get_vehicle(veh);
        assert_eq!(vehicle.state(), VehicleState::Merging);
        assert!((vehicle.vel() - frozen).abs() < 1e-9, "speed drifted mid-merge");
        assert!((vehicle.acceleration()).abs() < 1e-9);
        let progress = vehicle.merge_progress().unwrap();
        assert!(progress > 0.0 && progress < 1.0);
    }

    // After the 1 s duration elapses the vehicle drives freely again
    for _ in 0..10 {
        road.step(0.1);
    }
    assert_eq!(road.get_vehicle(veh).state(), VehicleState::Driving);
    assert!(road.get_vehicle(veh).vel() > frozen);
}

/// Test that starting a second lane change while merging is a no-op.
#[test]
fn lane_change_is_noop_while_merging() {
    let mut road = two_lane_road();
    let veh = road.add_vehicle(&car(), 0, 40.0).unwrap();
    for _ in 0..10 {
        road.step(0.1);
    }

    road.start_lane_change(veh, 1, 10.0, LaneChangePacing::ByDuration(1.0), false)
        .unwrap();
    assert_eq!(road.get_vehicle(veh).state(), VehicleState::Merging);

    // Re-targeting back to lane 0 must be ignored
    road.start_lane_change(veh, 0, 10.0, LaneChangePacing::ByDuration(1.0), false)
        .unwrap();

    let mut committed_lane = None;
    for _ in 0..15 {
        road.step(0.1);
        if road.get_vehicle(veh).state() == VehicleState::Driving {
            committed_lane = Some(road.get_vehicle(veh).lane());
            break;
        }
    }
    assert_eq!(committed_lane, Some(1));
}

/// Test that the reported pose blends between the lanes during a merge.
#[test]
fn pose_blends_between_lanes_during_merge() {
    let mut road = two_lane_road();
    let veh = road.add_vehicle(&car(), 0, 20.0).unwrap();
    for _ in 0..10 {
        road.step(0.1);
    }

    road.start_lane_change(veh, 1, 20.0, LaneChangePacing::ByDuration(1.0), false)
        .unwrap();
    let mut max_y: f64 = 0.0;
    for _ in 0..15 {
        road.step(0.1);
        let y = road.get_vehicle(veh).position().y;
        assert!(y >= -0.5 && y <= 4.0, "pose strayed off the transition: {y}");
        max_y = max_y.max(y);
        if road.get_vehicle(veh).state() == VehicleState::Driving {
            break;
        }
    }
    assert_eq!(road.get_vehicle(veh).state(), VehicleState::Driving);
    assert!(max_y > 3.0, "pose never approached the target lane");
}

/// Test that an unforced vehicle eventually changes lanes on its own.
#[test]
fn autonomous_lane_change_eventually_happens() {
    let mut road = two_lane_road();
    // Crawl so the vehicle stays on the open lane for the whole test
    let mut slow = car();
    slow.max_speed = 0.4;
    let veh = road.add_vehicle(&slow, 0, 0.0).unwrap();

    let mut rng = StdRng::seed_from_u64(42);
    let mut saw_merge = false;
    for _ in 0..20000 {
        road.step_with_rng(0.01, &mut rng);
        if road.iter_vehicles().count() == 0 {
            break;
        }
        let vehicle = road.get_vehicle(veh);
        if vehicle.state() == VehicleState::Merging || vehicle.lane() == 1 {
            saw_merge = true;
            break;
        }
    }
    assert!(saw_merge, "vehicle never attempted an autonomous lane change");
}
