use tile_traffic::simulation::fixtures::{self, node_at, LARGE_WORLD_LIGHT};
use tile_traffic::simulation::{
    validate_route, CarMake, CarStatus, Cell, Direction, LotDefinition, NodeKind, SimulationConfig,
    TilemapConfig, World,
};

#[test]
fn test_lot_attaches_and_receives_cars() {
    let mut world = fixtures::four_way_intersection().unwrap();
    let lot = world
        .add_lot_by_entry_cell(Cell::new(4, 3), LotDefinition::residential(Direction::Down))
        .unwrap();
    assert_eq!(world.lots().len(), 1);
    assert_eq!(world.lots()[&lot].entry_cell, Cell::new(4, 3));

    let network = world.network();
    let from = node_at(network, Cell::new(2, 3), Direction::Left, NodeKind::LaneEntry).unwrap();
    let lot_entry = node_at(network, Cell::new(4, 3), Direction::Up, NodeKind::LotEntry).unwrap();
    let car = world.spawn_car(from, lot_entry, CarMake::van()).unwrap();
    let route = world.car(car).unwrap().route.clone().unwrap();
    assert_eq!(route.destination(), Some(lot_entry));

    world.remove_road_at(Cell::new(4, 3)).unwrap();
    assert!(world.lots().is_empty());
    assert!(world
        .network()
        .nodes()
        .all(|node| !matches!(node.kind(), NodeKind::LotEntry | NodeKind::LotExit)));
    // Its destination is gone with the lot
    assert!(world.car(car).is_none());
    assert_eq!(world.stats().removed, 1);
}

#[test]
fn test_car_parks_on_arrival_at_lot() {
    let mut world = fixtures::four_way_intersection().unwrap();
    let lot = world
        .add_lot_by_entry_cell(Cell::new(4, 3), LotDefinition::residential(Direction::Down))
        .unwrap();
    let network = world.network();
    let from = node_at(network, Cell::new(2, 3), Direction::Left, NodeKind::LaneEntry).unwrap();
    let lot_entry = node_at(network, Cell::new(4, 3), Direction::Up, NodeKind::LotEntry).unwrap();
    let car = world.spawn_car(from, lot_entry, CarMake::sedan()).unwrap();

    for _ in 0..1000 {
        world.update_traffic(0.05);
        if world.car(car).is_none() {
            break;
        }
    }
    assert_eq!(world.stats().arrived, 1);
    assert_eq!(world.lots()[&lot].parked(), 1);
}

#[test]
fn test_lot_that_does_not_fit_changes_nothing() {
    let mut world = fixtures::four_way_intersection().unwrap();
    let before = world.tilemap().render();
    let nodes = world.network().node_count();

    let result = world.add_lot_by_entry_cell(Cell::new(2, 3), LotDefinition::residential(Direction::Down));
    assert!(result.is_err());
    assert_eq!(world.tilemap().render(), before);
    assert_eq!(world.network().node_count(), nodes);
    assert!(world.lots().is_empty());

    // Lot on the side the road already uses
    let result = world.add_lot_by_entry_cell(Cell::new(3, 2), LotDefinition::residential(Direction::Up));
    assert!(result.is_err());
    assert_eq!(world.tilemap().render(), before);
}

#[test]
fn test_car_reroutes_around_removed_road() {
    let mut world = fixtures::large_world(SimulationConfig::default()).unwrap();
    let network = world.network();
    let from = node_at(network, Cell::new(2, 2), Direction::Left, NodeKind::LaneEntry).unwrap();
    let to = node_at(network, Cell::new(13, 2), Direction::Right, NodeKind::LaneExit).unwrap();
    let car = world.spawn_car(from, to, CarMake::sedan()).unwrap();
    let original = world.car(car).unwrap().route.clone().unwrap();

    world.remove_road_at(Cell::new(5, 2)).unwrap();

    let stats = world.stats();
    assert_eq!(stats.rerouted, 1);
    assert_eq!(stats.removed, 0);
    let route = world.car(car).unwrap().route.clone().unwrap();
    assert!(validate_route(world.network(), &route));
    assert_eq!(route.destination(), Some(to));
    assert_eq!(route.current_edge(), original.current_edge());
    assert!(route.nodes.len() > original.nodes.len());

    // The detour still gets there
    for _ in 0..3000 {
        world.update_traffic(0.05);
        if world.car(car).is_none() {
            break;
        }
    }
    assert_eq!(world.stats().arrived, 1);
}

#[test]
fn test_car_removed_when_destination_disappears() {
    let mut world = fixtures::large_world(SimulationConfig::default()).unwrap();
    let network = world.network();
    let from = node_at(network, Cell::new(2, 2), Direction::Left, NodeKind::LaneEntry).unwrap();
    let to = node_at(network, Cell::new(5, 2), Direction::Right, NodeKind::LaneExit).unwrap();
    let car = world.spawn_car(from, to, CarMake::sedan()).unwrap();

    world.remove_road_at(Cell::new(5, 2)).unwrap();
    assert!(world.car(car).is_none());
    assert_eq!(world.stats().removed, 1);
    assert_eq!(world.stats().rerouted, 0);
}

#[test]
fn test_lights_follow_road_edits() {
    let mut world = fixtures::large_world(SimulationConfig::default()).unwrap();
    let count = |world: &World| {
        world
            .lights()
            .iter()
            .filter(|light| light.cell == LARGE_WORLD_LIGHT)
            .count()
    };
    assert_eq!(count(&world), 4);

    world.remove_road_at(Cell::new(7, 8)).unwrap();
    assert_eq!(count(&world), 3);

    world.remove_road_at(Cell::new(7, 6)).unwrap();
    assert_eq!(count(&world), 0);

    world.place_road(&[Cell::new(7, 6), Cell::new(7, 8)]).unwrap();
    assert_eq!(count(&world), 4);
}

#[test]
fn test_light_request_on_plain_road_waits_for_intersection() {
    let mut world = fixtures::four_way_intersection().unwrap();
    assert!(!world.add_traffic_light(Cell::new(2, 3)).unwrap());
    assert!(world.lights().is_empty());

    assert!(world.add_traffic_light(fixtures::FOUR_WAY_CENTER).unwrap());
    assert_eq!(world.lights().len(), 4);
    assert_eq!(world.light_phases().len(), 4);
}

#[test]
fn test_rerouting_a_moving_car_keeps_its_place() {
    let mut world = fixtures::large_world(SimulationConfig::default()).unwrap();
    let network = world.network();
    let from = node_at(network, Cell::new(2, 2), Direction::Left, NodeKind::LaneEntry).unwrap();
    let to = node_at(network, Cell::new(13, 2), Direction::Right, NodeKind::LaneExit).unwrap();
    let side_street = node_at(network, Cell::new(3, 3), Direction::Down, NodeKind::LaneExit).unwrap();
    let car = world.spawn_car(from, to, CarMake::sedan()).unwrap();

    let dt = 0.05;
    for _ in 0..10 {
        world.update_traffic(dt);
    }
    let before = world.car(car).unwrap().clone();
    assert!(before.velocity > 0.0);
    let old_route = before.route.clone().unwrap();

    world.route_car(car, side_street).unwrap();
    let moved = world.car(car).unwrap();
    assert!(moved.position.distance(&before.position) < 1e-4);
    assert_eq!(moved.velocity, before.velocity);
    let route = moved.route.clone().unwrap();
    assert_eq!(route.current_edge(), old_route.current_edge());
    assert_eq!(route.progress, old_route.progress);
    assert_eq!(route.destination(), Some(side_street));
    assert!(validate_route(world.network(), &route));

    // Motion stays continuous after the change
    let mut last = moved.position;
    for _ in 0..2000 {
        world.update_traffic(dt);
        let Some(current) = world.car(car) else { break };
        assert!(current.position.distance(&last) <= current.make.max_velocity * dt + 1e-3);
        last = current.position;
    }
    assert!(world.car(car).is_none());
    assert_eq!(world.stats().arrived, 1);
}

#[test]
fn test_spawn_without_route_creates_nothing() {
    let mut world = fixtures::disconnected_world().unwrap();
    let network = world.network();
    let west = node_at(network, Cell::new(2, 2), Direction::Left, NodeKind::LaneEntry).unwrap();
    let east = node_at(network, Cell::new(9, 4), Direction::Right, NodeKind::LaneExit).unwrap();

    assert!(world.spawn_car(west, east, CarMake::sedan()).is_err());
    assert!(world.cars().is_empty());
    assert_eq!(world.stats().spawned, 0);
}

#[test]
fn test_failed_reroute_leaves_car_idle() {
    let mut world = fixtures::disconnected_world().unwrap();
    let network = world.network();
    let west = node_at(network, Cell::new(2, 2), Direction::Left, NodeKind::LaneEntry).unwrap();
    let west_exit = node_at(network, Cell::new(3, 2), Direction::Right, NodeKind::LaneExit).unwrap();
    let east = node_at(network, Cell::new(9, 4), Direction::Right, NodeKind::LaneExit).unwrap();

    let car = world.spawn_car(west, west_exit, CarMake::hatchback()).unwrap();
    assert!(world.route_car(car, east).is_err());

    let idle = world.car(car).unwrap();
    assert_eq!(idle.status, CarStatus::Idle);
    assert!(idle.route.is_none());
    assert_eq!(idle.velocity, 0.0);

    // Idle cars stay put
    let position = idle.position;
    world.update_traffic(0.1);
    assert_eq!(world.car(car).unwrap().position, position);
}

#[test]
fn test_random_cars_spawn_apart() {
    let mut world = fixtures::large_world(SimulationConfig::with_seed(3)).unwrap();
    assert_eq!(world.spawn_random_cars(20), 20);
    assert_eq!(world.cars().len(), 20);
    assert_eq!(world.stats().spawned, 20);
    assert!(world.cars().values().all(|car| car.is_routed()));
}

#[test]
fn test_edits_rejected_while_generating() {
    let mut world = World::generate(TilemapConfig::city(6, 6, 2), SimulationConfig::with_seed(2));
    assert!(world.is_generating());
    assert!(world.place_road(&[Cell::new(1, 1)]).is_err());
    assert!(world.remove_road_at(Cell::new(1, 1)).is_err());
    assert!(world
        .add_lot_by_entry_cell(Cell::new(1, 1), LotDefinition::residential(Direction::Down))
        .is_err());
}
