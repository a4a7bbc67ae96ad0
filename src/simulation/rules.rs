//! Traffic rule engine
//!
//! Rules run in a fixed order: traffic lights, then collision geometry,
//! then right of way at unsignalled junctions. The first rule that fires
//! decides the kind of decision; the stop distance is the tightest one
//! any rule asks for. Every check reads the previous tick's snapshot, so
//! the outcome does not depend on the order cars are updated in.
//!
//! [`decide_all`] runs the rules for every car and then breaks yield
//! cycles, so a group of cars never waits on itself.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

use ordered_float::OrderedFloat;

use super::car::Car;
use super::config::TrafficConfig;
use super::geometry::point_segment_distance;
use super::road_network::{LanePriority, RoadNetwork};
use super::spatial::BucketGrid;
use super::traffic_light::Signal;
use super::types::{CarId, NodeId, Position};

/// How far past a node a front bumper may be and still count as before it
const STOP_LINE_TOLERANCE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YieldTo {
    Vehicle(CarId),
    Signal(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Proceed,
    Yield { to: YieldTo, stop_distance: f32 },
    Stop { stop_distance: f32 },
}

impl Decision {
    /// How far the front bumper may still move, if limited
    pub fn stop_distance(&self) -> Option<f32> {
        match self {
            Decision::Proceed => None,
            Decision::Yield { stop_distance, .. } | Decision::Stop { stop_distance } => Some(*stop_distance),
        }
    }

    fn limited_to(self, limit: f32) -> Self {
        let limit = limit.max(0.0);
        match self {
            Decision::Proceed => Decision::Proceed,
            Decision::Yield { to, .. } => Decision::Yield { to, stop_distance: limit },
            Decision::Stop { .. } => Decision::Stop { stop_distance: limit },
        }
    }
}

/// A car as seen by the rule engine during one tick
#[derive(Debug, Clone)]
pub struct CarView {
    pub car: Car,
    /// Projected front bumper positions
    pub path: Vec<Position>,
    /// Right of way of the junction lane the car is on or heading for
    pub approach: LanePriority,
    /// Already driving through a junction
    pub committed: bool,
}

impl CarView {
    pub fn new(car: &Car, network: &RoadNetwork, config: &TrafficConfig) -> Self {
        let path = car.projected_path(network, config);
        let lanes = car.lanes_ahead(network);
        let current = lanes.first().map(|lane| lane.priority);
        let committed = current.is_some_and(|p| p != LanePriority::Normal);

        let mut approach = LanePriority::Normal;
        for (_, distance, lane) in car.upcoming_nodes(network) {
            if distance > config.signal_lookahead {
                break;
            }
            if let Some(lane) = lane.filter(|lane| lane.priority != LanePriority::Normal) {
                approach = lane.priority;
                break;
            }
        }
        if let Some(priority) = current.filter(|p| *p != LanePriority::Normal) {
            approach = priority;
        }

        Self {
            car: car.clone(),
            path,
            approach,
            committed,
        }
    }

    pub fn id(&self) -> CarId {
        self.car.id
    }
}

/// Frozen state of every car at the start of a tick
#[derive(Debug, Clone)]
pub struct TrafficSnapshot {
    views: BTreeMap<CarId, CarView>,
    neighbors: BucketGrid<CarId>,
    lane_occupancy: HashMap<(NodeId, NodeId), BTreeMap<OrderedFloat<f32>, CarId>>,
}

impl TrafficSnapshot {
    pub fn capture(cars: &BTreeMap<CarId, Car>, network: &RoadNetwork, config: &TrafficConfig) -> Self {
        let (width, height) = network.grid().world_size();
        let mut neighbors = BucketGrid::new(width, height, config.neighbor_radius);
        let mut lane_occupancy: HashMap<(NodeId, NodeId), BTreeMap<OrderedFloat<f32>, CarId>> = HashMap::new();
        let mut views = BTreeMap::new();

        for (id, car) in cars {
            neighbors.insert(*id, car.position);
            if let Some(route) = &car.route {
                if let Some(edge) = route.current_edge() {
                    lane_occupancy
                        .entry(edge)
                        .or_default()
                        .insert(OrderedFloat(route.progress), *id);
                }
            }
            views.insert(*id, CarView::new(car, network, config));
        }

        Self {
            views,
            neighbors,
            lane_occupancy,
        }
    }

    pub fn view(&self, id: CarId) -> Option<&CarView> {
        self.views.get(&id)
    }

    pub fn views(&self) -> impl Iterator<Item = &CarView> {
        self.views.values()
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Other cars within `radius`, in id order
    pub fn neighbors_of(&self, id: CarId, radius: f32) -> Vec<&CarView> {
        let Some(me) = self.views.get(&id) else { return Vec::new() };
        let mut ids: Vec<CarId> = self
            .neighbors
            .query_radius(me.car.position, radius)
            .into_iter()
            .map(|(other, _)| other)
            .filter(|other| *other != id)
            .collect();
        ids.sort();
        ids.dedup();
        ids.iter().filter_map(|other| self.views.get(other)).collect()
    }

    pub fn cars_on_lane(&self, from: NodeId, to: NodeId) -> Vec<CarId> {
        self.lane_occupancy
            .get(&(from, to))
            .map(|cars| cars.values().copied().collect())
            .unwrap_or_default()
    }

    /// Nearest car further along the same lane
    pub fn car_ahead_on_lane(&self, from: NodeId, to: NodeId, progress: f32) -> Option<(f32, CarId)> {
        self.lane_occupancy
            .get(&(from, to))?
            .range((Bound::Excluded(OrderedFloat(progress)), Bound::Unbounded))
            .next()
            .map(|(distance, car)| (distance.into_inner(), *car))
    }
}

/// Everything `check_rules` needs for one car
pub struct RuleSetup<'a> {
    pub car: &'a CarView,
    pub others: Vec<&'a CarView>,
    pub network: &'a RoadNetwork,
    pub signals: &'a HashMap<NodeId, Signal>,
    pub snapshot: &'a TrafficSnapshot,
    pub config: &'a TrafficConfig,
    /// Cars this one no longer gives way to
    pub ignored: BTreeSet<CarId>,
}

impl<'a> RuleSetup<'a> {
    pub fn from_snapshot(
        snapshot: &'a TrafficSnapshot,
        id: CarId,
        network: &'a RoadNetwork,
        signals: &'a HashMap<NodeId, Signal>,
        config: &'a TrafficConfig,
    ) -> Option<Self> {
        let car = snapshot.view(id)?;
        Some(Self {
            car,
            others: snapshot.neighbors_of(id, config.neighbor_radius),
            network,
            signals,
            snapshot,
            config,
            ignored: BTreeSet::new(),
        })
    }

    pub fn ignoring(mut self, ignored: BTreeSet<CarId>) -> Self {
        self.ignored = ignored;
        self
    }

    fn considers(&self, id: CarId) -> bool {
        id != self.car.id() && !self.ignored.contains(&id)
    }
}

/// Decide what one car may do this tick
pub fn check_rules(setup: &RuleSetup) -> Decision {
    let mut decision: Option<Decision> = None;
    let mut limit = f32::MAX;
    let mut apply = |candidate: Decision, decision: &mut Option<Decision>| {
        if let Some(distance) = candidate.stop_distance() {
            limit = limit.min(distance);
        }
        if decision.is_none() {
            *decision = Some(candidate);
        }
    };

    if let Some(candidate) = check_lights(setup) {
        apply(candidate, &mut decision);
    }
    for candidate in check_collisions(setup) {
        apply(candidate, &mut decision);
    }
    if let Some(candidate) = check_right_of_way(setup) {
        apply(candidate, &mut decision);
    }

    match decision {
        Some(decision) => decision.limited_to(limit),
        None => Decision::Proceed,
    }
}

/// Red and yellow stop the car at the controlled node unless its front
/// is already past it
fn check_lights(setup: &RuleSetup) -> Option<Decision> {
    if !setup.car.car.is_routed() {
        return None;
    }
    for (node, distance, _) in setup.car.car.upcoming_nodes(setup.network) {
        if distance > setup.config.signal_lookahead {
            break;
        }
        if distance < -STOP_LINE_TOLERANCE {
            continue;
        }
        match setup.signals.get(&node) {
            Some(Signal::Stop | Signal::Caution) => {
                return Some(Decision::Stop {
                    stop_distance: distance.max(0.0),
                })
            }
            Some(Signal::Go) | None => {}
        }
    }
    None
}

/// Arc length along `path` to the first sample closer than `threshold`
/// to the segment `a-b`
fn first_hit_on_segment(path: &[Position], a: &Position, b: &Position, threshold: f32) -> Option<f32> {
    let mut arc = 0.0;
    for (i, point) in path.iter().enumerate() {
        if i > 0 {
            arc += path[i - 1].distance(point);
        }
        if point_segment_distance(point, a, b) < threshold {
            return Some(arc);
        }
    }
    None
}

/// Arc length along `path` to the first sample closer than `threshold`
/// to any segment of `other`
fn first_hit_on_path(path: &[Position], other: &[Position], threshold: f32) -> Option<f32> {
    let mut arc = 0.0;
    for (i, point) in path.iter().enumerate() {
        if i > 0 {
            arc += path[i - 1].distance(point);
        }
        let close = match other {
            [] => false,
            [only] => point.distance(only) < threshold,
            _ => other
                .windows(2)
                .any(|pair| point_segment_distance(point, &pair[0], &pair[1]) < threshold),
        };
        if close {
            return Some(arc);
        }
    }
    None
}

/// Halt one sample before the first conflicting sample
fn halt_before(arc: f32, step: f32) -> f32 {
    (arc - step).max(0.0)
}

fn check_collisions(setup: &RuleSetup) -> Vec<Decision> {
    let me = setup.car;
    if !me.car.is_routed() {
        return Vec::new();
    }
    let step = setup.config.path_step;
    let mut decisions = Vec::new();

    for other in setup.others.iter().filter(|other| setup.considers(other.id())) {
        let threshold = me.car.radius() + other.car.radius() + setup.config.safety_margin;

        let ahead = first_hit_on_segment(&me.path, &other.car.rear(), &other.car.front(), threshold);
        let behind = first_hit_on_segment(&other.path, &me.car.rear(), &me.car.front(), threshold).is_some();

        let yield_to = |arc: f32| Decision::Yield {
            to: YieldTo::Vehicle(other.id()),
            stop_distance: halt_before(arc, step),
        };

        match (ahead, behind) {
            (Some(arc), false) => decisions.push(yield_to(arc)),
            // Each is in the other's way; only one of them may wait
            (Some(arc), true) => {
                if !wins_conflict(me, other) {
                    decisions.push(yield_to(arc));
                }
            }
            (None, true) => {}
            (None, false) => {
                let Some(arc) = first_hit_on_path(&me.path, &other.path, threshold) else {
                    continue;
                };
                if !wins_conflict(me, other) {
                    decisions.push(yield_to(arc));
                }
            }
        }
    }
    decisions
}

/// A car already inside a junction goes first, then the higher
/// approach priority, then the lower id
fn wins_conflict(me: &CarView, other: &CarView) -> bool {
    if me.committed != other.committed {
        return me.committed;
    }
    if me.approach != other.approach {
        return me.approach > other.approach;
    }
    me.id() < other.id()
}

/// On a yield lane into an unsignalled junction, give way to priority
/// traffic that is inside or about to arrive
fn check_right_of_way(setup: &RuleSetup) -> Option<Decision> {
    let me = setup.car;
    if !me.car.is_routed() {
        return None;
    }
    let network = setup.network;

    let (node, distance) = me
        .car
        .upcoming_nodes(network)
        .into_iter()
        .take_while(|(_, distance, _)| *distance <= setup.config.signal_lookahead)
        .find(|(_, _, lane)| lane.is_some_and(|l| l.priority == LanePriority::Yield))
        .map(|(node, distance, _)| (node, distance))?;
    if distance < -STOP_LINE_TOLERANCE {
        return None;
    }
    let junction = network.node(node)?.cell();
    if network.traffic_light_cells().contains(&junction) {
        return None;
    }

    // Priority traffic already inside the junction
    let mut blocker: Option<CarId> = None;
    for entry in network.nodes_in_cell(&junction) {
        for lane in network.outgoing(entry.id) {
            if lane.priority != LanePriority::Priority {
                continue;
            }
            for id in setup.snapshot.cars_on_lane(lane.from, lane.to) {
                if setup.considers(id) {
                    blocker = Some(blocker.map_or(id, |b: CarId| b.min(id)));
                }
            }
        }
    }

    // Priority traffic about to arrive
    for other in setup.others.iter().filter(|other| setup.considers(other.id())) {
        let arriving = other
            .car
            .upcoming_nodes(network)
            .into_iter()
            .find(|(n, _, _)| network.node(*n).is_some_and(|n| n.cell() == junction));
        let Some((_, their_distance, Some(lane))) = arriving else {
            continue;
        };
        if lane.priority != LanePriority::Priority || their_distance < 0.0 {
            continue;
        }
        let time = their_distance / other.car.velocity.max(0.1);
        if time < setup.config.yield_time_threshold {
            blocker = Some(blocker.map_or(other.id(), |b| b.min(other.id())));
        }
    }

    blocker.map(|id| Decision::Yield {
        to: YieldTo::Vehicle(id),
        stop_distance: distance.max(0.0),
    })
}

fn yield_target(decision: &Decision) -> Option<CarId> {
    match decision {
        Decision::Yield {
            to: YieldTo::Vehicle(id),
            ..
        } => Some(*id),
        _ => None,
    }
}

/// First cycle of cars yielding to each other, in id order of discovery
fn find_yield_cycle(decisions: &BTreeMap<CarId, Decision>) -> Option<Vec<CarId>> {
    let mut settled: BTreeSet<CarId> = BTreeSet::new();
    for start in decisions.keys() {
        let mut path: Vec<CarId> = Vec::new();
        let mut current = *start;
        while !settled.contains(&current) {
            if let Some(at) = path.iter().position(|id| *id == current) {
                return Some(path.split_off(at));
            }
            path.push(current);
            match decisions.get(&current).and_then(yield_target) {
                Some(next) => current = next,
                None => break,
            }
        }
        settled.extend(path);
    }
    None
}

/// Decide every car in the snapshot. Whenever cars wait on each other in
/// a cycle, the one that wins the conflict against the rest stops giving
/// way to the car it was waiting on and is decided again.
pub fn decide_all(
    snapshot: &TrafficSnapshot,
    network: &RoadNetwork,
    signals: &HashMap<NodeId, Signal>,
    config: &TrafficConfig,
) -> BTreeMap<CarId, Decision> {
    let decide = |id: CarId, ignored: BTreeSet<CarId>| {
        RuleSetup::from_snapshot(snapshot, id, network, signals, config)
            .map(|setup| check_rules(&setup.ignoring(ignored)))
    };

    let mut decisions: BTreeMap<CarId, Decision> = snapshot
        .views()
        .filter_map(|view| decide(view.id(), BTreeSet::new()).map(|decision| (view.id(), decision)))
        .collect();

    // Every pass ignores one more pair, so this ends
    let mut ignored: BTreeMap<CarId, BTreeSet<CarId>> = BTreeMap::new();
    while let Some(cycle) = find_yield_cycle(&decisions) {
        let views: Vec<&CarView> = cycle.iter().filter_map(|id| snapshot.view(*id)).collect();
        let Some(released) = views
            .iter()
            .copied()
            .reduce(|best, view| if wins_conflict(view, best) { view } else { best })
            .map(CarView::id)
        else {
            break;
        };
        let Some(target) = decisions.get(&released).and_then(yield_target) else {
            break;
        };
        let skip = ignored.entry(released).or_default();
        skip.insert(target);
        match decide(released, skip.clone()) {
            Some(decision) => {
                decisions.insert(released, decision);
            }
            None => break,
        }
    }
    decisions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yielding(to: usize) -> Decision {
        Decision::Yield {
            to: YieldTo::Vehicle(CarId(to)),
            stop_distance: 0.0,
        }
    }

    #[test]
    fn test_finds_a_three_car_cycle() {
        let decisions = BTreeMap::from([
            (CarId(1), Decision::Proceed),
            (CarId(2), yielding(12)),
            (CarId(4), yielding(2)),
            (CarId(12), yielding(4)),
        ]);
        let mut cycle = find_yield_cycle(&decisions).unwrap();
        cycle.sort();
        assert_eq!(cycle, vec![CarId(2), CarId(4), CarId(12)]);
    }

    #[test]
    fn test_queue_is_not_a_cycle() {
        let decisions = BTreeMap::from([
            (CarId(0), Decision::Stop { stop_distance: 2.0 }),
            (CarId(1), yielding(0)),
            (CarId(2), yielding(1)),
            (CarId(3), yielding(1)),
        ]);
        assert_eq!(find_yield_cycle(&decisions), None);
    }
}
