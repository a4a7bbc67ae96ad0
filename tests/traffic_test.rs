use std::collections::{BTreeMap, HashMap};

use tile_traffic::simulation::fixtures::{self, node_at};
use tile_traffic::simulation::{
    check_rules, create_route, polygons_overlap, Car, CarId, CarMake, CarStatus, Cell, Decision,
    Direction, FsmBuilder, FsmError, LightPhase, NodeId, NodeKind, Position, Route, RuleSetup,
    Signal, SimulationConfig, TrafficConfig, TrafficLight, TrafficLightAction, TrafficLightTimers,
    TrafficSnapshot, YieldTo,
};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    A,
    B,
    C,
}

fn two_state_fsm() -> tile_traffic::simulation::Fsm<Phase, &'static str> {
    FsmBuilder::new()
        .state(Phase::A, vec!["enter a"], vec!["leave a"])
        .state(Phase::B, vec!["enter b"], vec!["leave b"])
        .timed(Phase::A, 1.0, Phase::B)
        .timed(Phase::B, 2.0, Phase::A)
        .build(Phase::A)
        .unwrap()
}

#[test]
fn test_fsm_carries_overshoot() {
    let mut fsm = two_state_fsm();

    let actions = fsm.update(1.5);
    assert_eq!(fsm.current(), Phase::B);
    assert!((fsm.elapsed() - 0.5).abs() < 1e-5);
    assert_eq!(actions, vec!["leave a", "enter b"]);
    assert!((fsm.remaining().unwrap() - 1.5).abs() < 1e-5);

    fsm.update(2.0);
    assert_eq!(fsm.current(), Phase::A);
    assert!((fsm.elapsed() - 0.5).abs() < 1e-5);

    // Several transitions in a single update
    let actions = fsm.update(3.6);
    assert_eq!(fsm.current(), Phase::B);
    assert!((fsm.elapsed() - 0.1).abs() < 1e-4);
    assert_eq!(actions.len(), 6);
}

#[test]
fn test_fsm_transition_to_resets_timer() {
    let mut fsm = two_state_fsm();
    fsm.update(0.7);
    let actions = fsm.transition_to(Phase::B).unwrap();
    assert_eq!(actions, vec!["leave a", "enter b"]);
    assert_eq!(fsm.elapsed(), 0.0);
    assert!(matches!(fsm.transition_to(Phase::C), Err(FsmError::UnknownState(_))));
    assert_eq!(fsm.current(), Phase::B);
}

#[test]
fn test_fsm_rejects_bad_definitions() {
    let zero = FsmBuilder::<Phase, ()>::new()
        .state(Phase::A, vec![], vec![])
        .state(Phase::B, vec![], vec![])
        .timed(Phase::A, 0.0, Phase::B)
        .build(Phase::A);
    assert!(matches!(zero, Err(FsmError::InvalidDuration { .. })));

    let unknown = FsmBuilder::<Phase, ()>::new()
        .state(Phase::A, vec![], vec![])
        .timed(Phase::A, 1.0, Phase::C)
        .build(Phase::A);
    assert!(matches!(unknown, Err(FsmError::UnknownState(_))));

    let duplicate = FsmBuilder::<Phase, ()>::new()
        .state(Phase::A, vec![], vec![])
        .state(Phase::A, vec![], vec![])
        .build(Phase::A);
    assert!(matches!(duplicate, Err(FsmError::DuplicateState(_))));

    let missing_initial = FsmBuilder::<Phase, ()>::new()
        .state(Phase::A, vec![], vec![])
        .build(Phase::B);
    assert!(matches!(missing_initial, Err(FsmError::UnknownState(_))));
}

#[test]
fn test_traffic_light_cycle() {
    let timers = TrafficLightTimers {
        green: 1.0,
        yellow: 0.5,
    };
    let node = NodeId(7);
    let mut light = TrafficLight::new(Cell::new(3, 3), node, true, &timers).unwrap();
    assert_eq!(light.phase(), LightPhase::Green);
    assert_eq!(
        light.sync(),
        vec![TrafficLightAction::SetSignal {
            node,
            signal: Signal::Go
        }]
    );

    assert_eq!(
        light.update(1.0),
        vec![TrafficLightAction::SetSignal {
            node,
            signal: Signal::Caution
        }]
    );
    assert_eq!(light.phase(), LightPhase::Yellow);

    light.update(0.5);
    assert_eq!(light.phase(), LightPhase::Red);
    assert_eq!(light.signal(), Signal::Stop);

    // Red lasts green + yellow
    light.update(1.4);
    assert_eq!(light.phase(), LightPhase::Red);
    light.update(0.2);
    assert_eq!(light.phase(), LightPhase::Green);
    assert_eq!(LightPhase::Red.duration(&timers), 1.5);
}

#[test]
fn test_vertical_light_starts_red_and_can_be_forced() {
    let timers = TrafficLightTimers::default();
    let mut vertical = TrafficLight::new(Cell::new(3, 3), NodeId(1), false, &timers).unwrap();
    assert_eq!(vertical.phase(), LightPhase::Red);

    let mut horizontal = TrafficLight::new(Cell::new(3, 3), NodeId(2), true, &timers).unwrap();
    horizontal.update(3.0);
    let actions = horizontal.force_red().unwrap();
    assert_eq!(horizontal.phase(), LightPhase::Red);
    assert_eq!(horizontal.elapsed(), 0.0);
    assert_eq!(
        actions,
        vec![TrafficLightAction::SetSignal {
            node: NodeId(2),
            signal: Signal::Stop
        }]
    );
    vertical.update(timers.red());
    assert_eq!(vertical.phase(), LightPhase::Green);
}

#[test]
fn test_invalid_timers_are_rejected() {
    let timers = TrafficLightTimers {
        green: 0.0,
        yellow: 1.0,
    };
    assert!(TrafficLight::new(Cell::new(1, 1), NodeId(0), true, &timers).is_err());
}

#[test]
fn test_car_stops_at_red_light() {
    let (mut world, car) = fixtures::red_light_world(SimulationConfig::default()).unwrap();
    let stop_line = node_at(
        world.network(),
        fixtures::FOUR_WAY_CENTER,
        Direction::Up,
        NodeKind::LaneEntry,
    )
    .unwrap();
    let stop_y = world.network().node(stop_line).unwrap().position.y;
    assert_eq!(world.signal(stop_line), Some(Signal::Stop));

    let dt = 0.05;
    for _ in 0..100 {
        world.update_traffic(dt);
        let front = world.car(car).unwrap().front();
        assert!(front.y <= stop_y + 0.5, "ran the red light: front at {:?}", front);
    }
    let waiting = world.car(car).unwrap();
    assert_eq!(waiting.status, CarStatus::StoppedAtLight);
    assert!(waiting.velocity < 0.5);

    for _ in 0..500 {
        world.update_traffic(dt);
        if world.car(car).is_none() {
            break;
        }
    }
    assert!(world.car(car).is_none(), "car never got through the junction");
    assert_eq!(world.stats().arrived, 1);
    assert!(world.time > world.config().lights.red());
}

#[test]
fn test_yield_road_gives_way_to_priority_road() {
    let (mut world, eastbound, southbound) = fixtures::crossing_paths_world().unwrap();

    let mut south_yielded = false;
    let mut arrivals: Vec<CarId> = Vec::new();
    for _ in 0..1200 {
        world.update_traffic(0.05);

        if let Some(car) = world.car(eastbound) {
            assert_ne!(car.status, CarStatus::Yielding, "priority car yielded");
        }
        if let Some(car) = world.car(southbound) {
            south_yielded |= car.status == CarStatus::Yielding;
        }
        if let (Some(a), Some(b)) = (world.car(eastbound), world.car(southbound)) {
            assert!(!polygons_overlap(&a.shape(), &b.shape()), "cars overlap at {}", world.time);
        }
        for id in [eastbound, southbound] {
            if world.car(id).is_none() && !arrivals.contains(&id) {
                arrivals.push(id);
            }
        }
        if arrivals.len() == 2 {
            break;
        }
    }

    assert!(south_yielded);
    assert_eq!(arrivals, vec![eastbound, southbound]);
    assert_eq!(world.stats().arrived, 2);
}

#[test]
fn test_same_inputs_give_same_traffic() {
    let run = || {
        let (mut world, _, _) = fixtures::crossing_paths_world().unwrap();
        for _ in 0..80 {
            world.update_traffic(0.05);
        }
        (world.cars().clone(), world.stats())
    };
    assert_eq!(run(), run());
}

/// Two sedans on the first lane of the eastbound route
fn queued_cars() -> (tile_traffic::simulation::World, BTreeMap<CarId, Car>, NodeId, NodeId) {
    let world = fixtures::four_way_intersection().unwrap();
    let network = world.network();
    let from = node_at(network, Cell::new(2, 3), Direction::Left, NodeKind::LaneEntry).unwrap();
    let to = node_at(network, Cell::new(4, 3), Direction::Right, NodeKind::LaneExit).unwrap();
    let nodes = create_route(network, from, to).unwrap().nodes;
    let lane_end = nodes[1];

    let place = |id: usize, progress: f32| {
        let route = Route {
            nodes: nodes.clone(),
            current: 0,
            progress,
        };
        Car::new(CarId(id), CarMake::sedan(), Position::default(), 0.0).routed(route, network)
    };
    let cars = BTreeMap::from([(CarId(0), place(0, 10.0)), (CarId(1), place(1, 3.0))]);
    (world, cars, from, lane_end)
}

#[test]
fn test_follower_yields_to_car_ahead() {
    let (world, cars, from, lane_end) = queued_cars();
    let network = world.network();
    let config = TrafficConfig::default();
    let snapshot = TrafficSnapshot::capture(&cars, network, &config);
    let signals: HashMap<NodeId, Signal> = HashMap::new();

    assert_eq!(snapshot.cars_on_lane(from, lane_end), vec![CarId(1), CarId(0)]);
    assert_eq!(snapshot.car_ahead_on_lane(from, lane_end, 3.0), Some((10.0, CarId(0))));
    assert_eq!(snapshot.car_ahead_on_lane(from, lane_end, 10.0), None);

    let follower = RuleSetup::from_snapshot(&snapshot, CarId(1), network, &signals, &config).unwrap();
    match check_rules(&follower) {
        Decision::Yield {
            to: YieldTo::Vehicle(leader),
            stop_distance,
        } => {
            assert_eq!(leader, CarId(0));
            assert!(stop_distance < 1.0);
        }
        other => panic!("follower should yield, got {:?}", other),
    }

    let leader = RuleSetup::from_snapshot(&snapshot, CarId(0), network, &signals, &config).unwrap();
    assert_eq!(check_rules(&leader), Decision::Proceed);
}

#[test]
fn test_decisions_do_not_depend_on_evaluation_order() {
    let (world, cars, _, _) = queued_cars();
    let network = world.network();
    let config = TrafficConfig::default();
    let snapshot = TrafficSnapshot::capture(&cars, network, &config);
    let signals: HashMap<NodeId, Signal> = HashMap::new();

    let decide = |id: CarId| {
        let setup = RuleSetup::from_snapshot(&snapshot, id, network, &signals, &config).unwrap();
        (id, check_rules(&setup))
    };
    let forward: BTreeMap<CarId, Decision> = [CarId(0), CarId(1)].into_iter().map(decide).collect();
    let backward: BTreeMap<CarId, Decision> = [CarId(1), CarId(0)].into_iter().map(decide).collect();
    assert_eq!(forward, backward);
}

#[test]
fn test_red_signal_stops_a_car_in_the_rule_engine() {
    let (world, cars, _, lane_end) = queued_cars();
    let network = world.network();
    let config = TrafficConfig::default();
    let snapshot = TrafficSnapshot::capture(&cars, network, &config);
    let signals = HashMap::from([(lane_end, Signal::Stop)]);

    let leader = RuleSetup::from_snapshot(&snapshot, CarId(0), network, &signals, &config).unwrap();
    match check_rules(&leader) {
        Decision::Stop { stop_distance } => {
            // Lane is 14 long, the leader's centre is at 10 and its front 2.2 ahead
            assert!((stop_distance - 1.8).abs() < 1e-3);
        }
        other => panic!("expected a stop, got {:?}", other),
    }
}

#[test]
fn test_yellow_signal_also_stops_a_car() {
    let (world, cars, _, lane_end) = queued_cars();
    let network = world.network();
    let config = TrafficConfig::default();
    let snapshot = TrafficSnapshot::capture(&cars, network, &config);
    let signals = HashMap::from([(lane_end, Signal::Caution)]);

    let leader = RuleSetup::from_snapshot(&snapshot, CarId(0), network, &signals, &config).unwrap();
    match check_rules(&leader) {
        Decision::Stop { stop_distance } => assert!((stop_distance - 1.8).abs() < 1e-3),
        other => panic!("yellow should stop the car, got {:?}", other),
    }

    // The follower still queues behind the leader
    let follower = RuleSetup::from_snapshot(&snapshot, CarId(1), network, &signals, &config).unwrap();
    assert!(check_rules(&follower).stop_distance().unwrap() < 1.0);
}
