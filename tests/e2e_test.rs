//! Many cars on the large map with fast lights

use std::collections::BTreeMap;

use tile_traffic::simulation::fixtures;
use tile_traffic::simulation::{
    polygons_overlap, CarId, Decision, LightPhase, NodeId, SimulationConfig, TilemapConfig,
    TrafficLightTimers, World, YieldTo,
};

fn fast_light_world() -> World {
    let mut config = SimulationConfig::with_seed(11);
    config.lights = TrafficLightTimers {
        green: 0.4,
        yellow: 0.2,
    };
    fixtures::large_world(config).unwrap()
}

fn assert_no_overlaps(world: &World) {
    let shapes: Vec<(CarId, _)> = world.cars().values().map(|car| (car.id, car.shape())).collect();
    for (i, (a, shape_a)) in shapes.iter().enumerate() {
        for (b, shape_b) in &shapes[i + 1..] {
            assert!(
                !polygons_overlap(shape_a, shape_b),
                "cars {} and {} overlap at t={:.3}",
                a,
                b,
                world.time
            );
        }
    }
}

#[test]
fn test_busy_map_stays_collision_free() {
    let mut world = fast_light_world();
    assert_eq!(world.spawn_random_cars(50), 50);
    assert_no_overlaps(&world);

    for _ in 0..100 {
        world.update_traffic(0.016);
        assert_no_overlaps(&world);
    }
    assert_eq!(world.stats().spawned, 50);
}

#[test]
fn test_lights_cycle_on_time() {
    let mut world = fast_light_world();
    world.spawn_random_cars(50);
    let timers = world.config().lights;
    let dt = 0.016;

    let mut phases: BTreeMap<NodeId, LightPhase> = world.light_phases();
    assert_eq!(phases.len(), 4);
    let mut started: BTreeMap<NodeId, f32> = phases.keys().map(|node| (*node, 0.0)).collect();
    let mut completed = 0;

    for _ in 0..100 {
        world.update_traffic(dt);
        for (node, phase) in world.light_phases() {
            let previous = phases[&node];
            if phase == previous {
                continue;
            }
            assert_eq!(phase, previous.next(), "light {} skipped a phase", node);
            let measured = world.time - started[&node];
            let expected = previous.duration(&timers);
            assert!(
                (measured - expected).abs() <= dt + 1e-3,
                "{:?} on light {} lasted {:.3}s, expected {:.3}s",
                previous,
                node,
                measured,
                expected
            );
            phases.insert(node, phase);
            started.insert(node, world.time);
            completed += 1;
        }
    }
    // 1.6s covers at least two full phases per light
    assert!(completed >= 8);
}

fn yields_to(decisions: &BTreeMap<CarId, Decision>, car: CarId) -> Option<CarId> {
    match decisions.get(&car) {
        Some(Decision::Yield {
            to: YieldTo::Vehicle(other),
            ..
        }) => Some(*other),
        _ => None,
    }
}

#[test]
fn test_generated_map_never_gridlocks() {
    let mut world = World::generate(TilemapConfig::city(16, 12, 1), SimulationConfig::with_seed(1));
    let mut ticks = 0;
    while world.is_generating() {
        world.tick(0.05).unwrap();
        ticks += 1;
        assert!(ticks < 100_000, "generation never finished");
    }
    let spawned = world.spawn_random_cars(30);
    assert!(spawned > 0);

    // Long enough for a car waiting on a cycle to hit the stuck timeout
    let dt = 0.05;
    let steps = ((world.config().traffic.max_wait_time + 40.0) / dt) as usize;
    for step in 0..steps {
        if step % 10 == 0 {
            let decisions = world.decisions();
            for car in decisions.keys() {
                if let Some(other) = yields_to(&decisions, *car) {
                    assert_ne!(
                        yields_to(&decisions, other),
                        Some(*car),
                        "cars {} and {} wait on each other at t={:.2}",
                        car,
                        other,
                        world.time
                    );
                }
            }
        }
        world.update_traffic(dt);
    }

    let stats = world.stats();
    assert_eq!(stats.stuck, 0);
    assert_eq!(stats.spawned, spawned);
}
