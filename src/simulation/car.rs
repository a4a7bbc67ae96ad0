//! Vehicle steering along routes
//!
//! A car follows its route lane by lane. Each tick the rule engine hands
//! it a [`Decision`]; steering turns that into a target speed, never moves
//! further than the decision's stop distance and reports despawns.

use super::config::TrafficConfig;
use super::geometry::oriented_rectangle;
use super::lot::CarMake;
use super::pathfinding::{validate_route, Route};
use super::road_network::{Lane, RoadNetwork};
use super::rules::Decision;
use super::types::{CarId, NodeId, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CarStatus {
    Idle,
    Moving,
    Yielding,
    StoppedAtLight,
    Despawning,
}

/// Things the world has to act on after a car update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarEvent {
    /// The car reached the last node of its route
    Arrived { car: CarId, node: NodeId },
    /// The car waited too long without moving
    Stuck(CarId),
    /// The lane the car needs no longer exists
    RouteInvalidated(CarId),
    Despawn(CarId),
}

/// A vehicle in the simulation
#[derive(Debug, Clone, PartialEq)]
pub struct Car {
    pub id: CarId,
    pub make: CarMake,
    pub position: Position,
    /// Heading angle in radians
    pub orientation: f32,
    pub velocity: f32,
    pub route: Option<Route>,
    pub status: CarStatus,
    /// Seconds spent without moving
    pub waiting: f32,
}

impl Car {
    pub fn new(id: CarId, make: CarMake, position: Position, orientation: f32) -> Self {
        Self {
            id,
            make,
            position,
            orientation,
            velocity: 0.0,
            route: None,
            status: CarStatus::Idle,
            waiting: 0.0,
        }
    }

    /// Attach a route and move the car to its first lane. Routes too
    /// short to drive leave the car idle.
    pub fn routed(mut self, route: Route, network: &RoadNetwork) -> Self {
        let Some(lane) = route.current_edge().and_then(|(a, b)| network.lane(a, b)) else {
            self.route = None;
            self.status = CarStatus::Idle;
            return self;
        };
        self.position = lane.point_at(route.progress);
        self.orientation = lane.heading_at(route.progress);
        self.route = Some(route);
        self.status = CarStatus::Moving;
        self
    }

    pub fn is_routed(&self) -> bool {
        self.route.is_some()
    }

    pub fn heading(&self) -> Position {
        Position::from_angle(self.orientation)
    }

    pub fn front(&self) -> Position {
        self.position.add(&self.heading().scale(self.make.length / 2.0))
    }

    pub fn rear(&self) -> Position {
        self.position.sub(&self.heading().scale(self.make.length / 2.0))
    }

    /// Radius of the capsule around the rear-front segment
    pub fn radius(&self) -> f32 {
        self.make.width / 2.0
    }

    /// Bounding rectangle
    pub fn shape(&self) -> Vec<Position> {
        oriented_rectangle(&self.position, self.orientation, self.make.length, self.make.width)
    }

    /// Lanes from the current one to the destination, stopping at the
    /// first missing lane
    pub fn lanes_ahead<'a>(&self, network: &'a RoadNetwork) -> Vec<&'a Lane> {
        let Some(route) = &self.route else { return Vec::new() };
        route
            .remaining()
            .windows(2)
            .map_while(|pair| network.lane(pair[0], pair[1]))
            .collect()
    }

    /// Distance the centre still has to travel to the destination
    pub fn distance_to_destination(&self, network: &RoadNetwork) -> f32 {
        let progress = self.route.as_ref().map_or(0.0, |r| r.progress);
        let total: f32 = self.lanes_ahead(network).iter().map(|lane| lane.length).sum();
        (total - progress).max(0.0)
    }

    /// Distance from the front bumper to each upcoming route node, paired
    /// with the lane that leaves that node (if any)
    pub fn upcoming_nodes<'a>(&self, network: &'a RoadNetwork) -> Vec<(NodeId, f32, Option<&'a Lane>)> {
        let Some(route) = &self.route else { return Vec::new() };
        let lanes = self.lanes_ahead(network);
        let mut travelled = -route.progress - self.make.length / 2.0;
        let mut result = Vec::with_capacity(lanes.len());
        for (i, lane) in lanes.iter().enumerate() {
            travelled += lane.length;
            result.push((lane.to, travelled, lanes.get(i + 1).copied()));
        }
        result
    }

    /// Short-horizon projection of the front bumper along the route,
    /// sampled every `path_step`
    pub fn projected_path(&self, network: &RoadNetwork, config: &TrafficConfig) -> Vec<Position> {
        let Some(route) = &self.route else {
            return vec![self.front()];
        };
        let lanes = self.lanes_ahead(network);
        if lanes.is_empty() {
            return vec![self.front()];
        }

        let horizon = (self.velocity * config.horizon_time).clamp(config.min_horizon, config.max_horizon);
        let total: f32 = lanes.iter().map(|lane| lane.length).sum();
        let start = (route.progress + self.make.length / 2.0).min(total);
        let end = (start + horizon).min(total);
        let step = config.path_step.max(0.1);

        let mut points = Vec::new();
        let mut arc = start;
        loop {
            points.push(point_on_lanes(&lanes, arc));
            if arc >= end {
                break;
            }
            arc = (arc + step).min(end);
        }
        points
    }
}

/// Point at `arc` along consecutive lanes
fn point_on_lanes(lanes: &[&Lane], arc: f32) -> Position {
    let mut remaining = arc.max(0.0);
    for lane in lanes {
        if remaining <= lane.length {
            return lane.point_at(remaining);
        }
        remaining -= lane.length;
    }
    lanes.last().map_or(Position::default(), |lane| lane.end())
}

/// Advance a car by `delta` seconds under `decision`
pub fn update_car(
    delta: f32,
    network: &RoadNetwork,
    car: &Car,
    decision: &Decision,
    config: &TrafficConfig,
) -> (Car, Vec<CarEvent>) {
    let mut car = car.clone();
    let mut events = Vec::new();

    let Some(route) = &car.route else {
        car.velocity = 0.0;
        car.status = CarStatus::Idle;
        return (car, events);
    };
    if !validate_route(network, route) {
        car.velocity = 0.0;
        events.push(CarEvent::RouteInvalidated(car.id));
        return (car, events);
    }

    // Target speed from braking distances
    let stop_distance = decision.stop_distance().unwrap_or(f32::MAX).max(0.0);
    let to_end = car.distance_to_destination(network);
    let decel = car.make.deceleration;
    let mut target = car.make.max_velocity;
    if stop_distance < f32::MAX {
        target = target.min((2.0 * decel * stop_distance).sqrt());
    }
    target = target.min((config.arrival_speed.powi(2) + 2.0 * decel * to_end).sqrt());

    car.velocity = if target > car.velocity {
        (car.velocity + car.make.acceleration * delta).min(target)
    } else {
        (car.velocity - decel * delta).max(target)
    };

    let wanted = car.velocity * delta;
    let advance = wanted.min(stop_distance);
    if advance < wanted && delta > 0.0 {
        car.velocity = advance / delta;
    }

    // Move along the route lane by lane
    let Some(mut route) = car.route.take() else {
        return (car, events);
    };
    route.progress += advance;
    loop {
        let Some(lane) = route.current_edge().and_then(|(a, b)| network.lane(a, b)) else {
            car.route = Some(route);
            events.push(CarEvent::RouteInvalidated(car.id));
            return (car, events);
        };
        if route.progress < lane.length {
            car.position = lane.point_at(route.progress);
            car.orientation = lane.heading_at(route.progress);
            break;
        }
        if route.current + 2 >= route.nodes.len() {
            car.position = lane.end();
            car.orientation = lane.heading_at(lane.length);
            car.velocity = 0.0;
            car.status = CarStatus::Despawning;
            events.push(CarEvent::Arrived {
                car: car.id,
                node: lane.to,
            });
            events.push(CarEvent::Despawn(car.id));
            route.progress = lane.length;
            car.route = Some(route);
            return (car, events);
        }
        route.progress -= lane.length;
        route.current += 1;
    }
    car.route = Some(route);

    car.waiting = if advance > 1e-4 { 0.0 } else { car.waiting + delta };
    car.status = match decision {
        Decision::Proceed => CarStatus::Moving,
        Decision::Stop { .. } => CarStatus::StoppedAtLight,
        Decision::Yield { .. } => CarStatus::Yielding,
    };
    if car.waiting >= config.max_wait_time {
        car.status = CarStatus::Despawning;
        events.push(CarEvent::Stuck(car.id));
        events.push(CarEvent::Despawn(car.id));
    }
    (car, events)
}
