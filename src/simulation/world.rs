//! Top-level simulation state
//!
//! `World` owns the tilemap, the road network derived from it, traffic
//! lights, lots and cars. It drives tile generation, runs traffic ticks
//! and applies map edits, keeping the road network and every route in
//! line with the tilemap after each change.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;

use super::car::{update_car, Car, CarEvent, CarStatus};
use super::cell::Cell;
use super::config::SimulationConfig;
use super::error::RoutingFailure;
use super::geometry::segment_distance;
use super::lot::{CarMake, Lot, LotDefinition};
use super::pathfinding::{create_route, find_path, validate_route, Route};
use super::road_network::{EdgeStrategy, NodeKind, RoadNetwork};
use super::rules::{decide_all, Decision, TrafficSnapshot};
use super::tilemap::{Tilemap, TilemapConfig};
use super::traffic_light::{LightPhase, Signal, TrafficLight, TrafficLightAction};
use super::types::{CarId, LotId, NodeId};
use super::wfc::{Model, SupervisorState};

/// Counters reported at the end of a run
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimulationStats {
    pub spawned: usize,
    pub arrived: usize,
    pub stuck: usize,
    /// Cars removed because their route could not be repaired
    pub removed: usize,
    pub rerouted: usize,
}

impl SimulationStats {
    /// Percentage of spawned cars that reached their destination
    pub fn success_rate(&self) -> f32 {
        if self.spawned == 0 {
            return 0.0;
        }
        self.arrived as f32 / self.spawned as f32 * 100.0
    }
}

pub struct World {
    tilemap: Tilemap,
    network: RoadNetwork,
    requested_lights: BTreeSet<Cell>,
    lights: Vec<TrafficLight>,
    signals: HashMap<NodeId, Signal>,
    cars: BTreeMap<CarId, Car>,
    lots: BTreeMap<LotId, Lot>,
    generator: Option<Model>,
    generation_attempts: u32,
    rng: StdRng,
    config: SimulationConfig,
    stats: SimulationStats,
    next_car_id: usize,
    next_lot_id: usize,
    /// Simulated seconds of traffic
    pub time: f32,
}

impl World {
    fn new_internal(tilemap: Tilemap, generator: Option<Model>, config: SimulationConfig) -> Self {
        let network = RoadNetwork::new(*tilemap.grid(), EdgeStrategy::default());
        Self {
            tilemap,
            network,
            requested_lights: BTreeSet::new(),
            lights: Vec::new(),
            signals: HashMap::new(),
            cars: BTreeMap::new(),
            lots: BTreeMap::new(),
            generator,
            generation_attempts: 0,
            rng: StdRng::seed_from_u64(config.seed),
            config,
            stats: SimulationStats::default(),
            next_car_id: 0,
            next_lot_id: 0,
            time: 0.0,
        }
    }

    /// World on a finished tilemap with lights requested on `traffic_lights`
    pub fn new(tilemap: Tilemap, traffic_lights: &[Cell], config: SimulationConfig) -> Result<Self> {
        let mut world = Self::new_internal(tilemap, None, config);
        world.requested_lights = traffic_lights.iter().copied().collect();
        world.rebuild_network()?;
        Ok(world)
    }

    /// World whose tilemap is generated over the following ticks
    pub fn generate(tilemap_config: TilemapConfig, config: SimulationConfig) -> Self {
        let model = Model::init(tilemap_config);
        let tilemap = model.to_tilemap();
        Self::new_internal(tilemap, Some(model), config)
    }

    pub fn is_generating(&self) -> bool {
        self.generator.is_some()
    }

    /// The map as it currently stands, partially collapsed while generating
    pub fn tilemap(&self) -> &Tilemap {
        match &self.generator {
            Some(model) => model.tilemap(),
            None => &self.tilemap,
        }
    }

    pub fn network(&self) -> &RoadNetwork {
        &self.network
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn stats(&self) -> SimulationStats {
        self.stats
    }

    pub fn cars(&self) -> &BTreeMap<CarId, Car> {
        &self.cars
    }

    pub fn car(&self, id: CarId) -> Option<&Car> {
        self.cars.get(&id)
    }

    pub fn lots(&self) -> &BTreeMap<LotId, Lot> {
        &self.lots
    }

    pub fn lights(&self) -> &[TrafficLight] {
        &self.lights
    }

    pub fn signal(&self, node: NodeId) -> Option<Signal> {
        self.signals.get(&node).copied()
    }

    /// Choose a random element from a slice using the world's seeded RNG
    fn choose_random<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        slice.choose(&mut self.rng)
    }

    fn next_car_id(&mut self) -> CarId {
        let id = CarId(self.next_car_id);
        self.next_car_id += 1;
        id
    }

    /// Advance tile generation by `delta` seconds worth of propagation
    /// steps. Once the map is done the road network is built.
    pub fn update_tilemap(&mut self, delta: f32) -> Result<()> {
        let Some(model) = self.generator.as_mut() else {
            return Ok(());
        };
        let steps = (self.config.generation.steps_per_second * delta).ceil().max(1.0) as usize;
        for _ in 0..steps {
            match model.supervisor() {
                SupervisorState::Generating => model.propagate(),
                SupervisorState::Done => break,
                SupervisorState::Recovering => {
                    if model.discard_failed_pick() {
                        continue;
                    }
                    self.generation_attempts += 1;
                    let reason = model.failure_description().unwrap_or_default();
                    if self.generation_attempts >= self.config.generation.max_attempts {
                        bail!(
                            "tile generation failed after {} attempts: {}",
                            self.generation_attempts,
                            reason
                        );
                    }
                    warn!("tile generation stuck ({}), reseeding", reason);
                    let mut tilemap_config = model.tilemap().config().clone();
                    tilemap_config.seed = tilemap_config.seed.wrapping_add(u64::from(self.generation_attempts));
                    *model = Model::init(tilemap_config);
                }
            }
        }

        if model.supervisor() != SupervisorState::Done {
            return Ok(());
        }
        let steps = model.steps();
        if let Some(model) = self.generator.take() {
            self.tilemap = model.into_tilemap();
        }
        // Generated maps get a light on every crossroads
        let grid = *self.tilemap.grid();
        self.requested_lights = grid
            .cells()
            .filter(|cell| self.tilemap.single_at(cell).is_some_and(|tile| tile.road_sides().len() == 4))
            .collect();
        self.rebuild_network()?;
        info!(
            "generated {}x{} map in {} steps: {} road cells, {} nodes, {} lanes",
            grid.horizontal_cells,
            grid.vertical_cells,
            steps,
            self.tilemap.road_cells().len(),
            self.network.node_count(),
            self.network.lane_count()
        );
        Ok(())
    }

    fn rebuild_network(&mut self) -> Result<()> {
        let lights: Vec<Cell> = self.requested_lights.iter().copied().collect();
        self.network = RoadNetwork::build(&self.tilemap, &lights, EdgeStrategy::default());
        self.sync_lights()
    }

    /// Match traffic lights to the network's active light cells. A cell
    /// whose approaches are unchanged keeps its lights and their phases.
    fn sync_lights(&mut self) -> Result<()> {
        let mut wanted: BTreeMap<Cell, Vec<(NodeId, bool)>> = BTreeMap::new();
        for cell in self.network.traffic_light_cells() {
            let approaches = self
                .network
                .approaches(cell)
                .into_iter()
                .map(|node| (node.id, node.key.side.is_horizontal()))
                .collect();
            wanted.insert(*cell, approaches);
        }

        let mut existing: BTreeMap<Cell, Vec<TrafficLight>> = BTreeMap::new();
        for light in self.lights.drain(..) {
            existing.entry(light.cell).or_default().push(light);
        }

        let mut lights = Vec::new();
        for (cell, approaches) in wanted {
            let mut nodes: Vec<NodeId> = approaches.iter().map(|(node, _)| *node).collect();
            nodes.sort();
            if let Some(current) = existing.remove(&cell) {
                let mut current_nodes: Vec<NodeId> = current.iter().map(|light| light.node).collect();
                current_nodes.sort();
                if current_nodes == nodes {
                    lights.extend(current);
                    continue;
                }
            }
            for (node, horizontal) in approaches {
                let light = TrafficLight::new(cell, node, horizontal, &self.config.lights)
                    .with_context(|| format!("invalid traffic light timers for {}", cell))?;
                lights.push(light);
            }
        }

        self.lights = lights;
        self.signals.clear();
        let actions: Vec<TrafficLightAction> = self.lights.iter().flat_map(|light| light.sync()).collect();
        for action in actions {
            self.apply_light_action(action);
        }
        Ok(())
    }

    fn apply_light_action(&mut self, action: TrafficLightAction) {
        match action {
            TrafficLightAction::SetSignal { node, signal } => {
                self.signals.insert(node, signal);
            }
        }
    }

    fn update_lights(&mut self, delta: f32) {
        let mut actions = Vec::new();
        for light in &mut self.lights {
            actions.extend(light.update(delta));
        }
        for action in actions {
            self.apply_light_action(action);
        }
    }

    /// Current phase of every light, keyed by approach node
    pub fn light_phases(&self) -> BTreeMap<NodeId, LightPhase> {
        self.lights.iter().map(|light| (light.node, light.phase())).collect()
    }

    /// One traffic tick: lights, then rule checks against a frozen
    /// snapshot, then all car updates are committed together
    pub fn update_traffic(&mut self, delta: f32) {
        self.time += delta;
        self.update_lights(delta);

        let snapshot = TrafficSnapshot::capture(&self.cars, &self.network, &self.config.traffic);
        let decisions = decide_all(&snapshot, &self.network, &self.signals, &self.config.traffic);
        let mut updated = Vec::with_capacity(snapshot.len());
        let mut events = Vec::new();
        for view in snapshot.views() {
            let Some(decision) = decisions.get(&view.id()) else {
                continue;
            };
            let (car, car_events) = update_car(delta, &self.network, &view.car, decision, &self.config.traffic);
            updated.push(car);
            events.extend(car_events);
        }

        for car in updated {
            self.cars.insert(car.id, car);
        }
        for event in events {
            self.handle_event(event);
        }
    }

    /// What every car would be told to do if a tick ran now
    pub fn decisions(&self) -> BTreeMap<CarId, Decision> {
        let snapshot = TrafficSnapshot::capture(&self.cars, &self.network, &self.config.traffic);
        decide_all(&snapshot, &self.network, &self.signals, &self.config.traffic)
    }

    /// Generate while the map is unfinished, run traffic afterwards
    pub fn tick(&mut self, delta: f32) -> Result<()> {
        if self.is_generating() {
            self.update_tilemap(delta)
        } else {
            self.update_traffic(delta);
            Ok(())
        }
    }

    fn handle_event(&mut self, event: CarEvent) {
        match event {
            CarEvent::Arrived { car, node } => {
                debug!("car {} arrived at node {}", car, node);
                self.stats.arrived += 1;
                self.park_at(car, node);
            }
            CarEvent::Stuck(car) => {
                debug!("car {} gave up waiting", car);
                self.stats.stuck += 1;
            }
            CarEvent::RouteInvalidated(car) => {
                self.repair_route(car);
            }
            CarEvent::Despawn(car) => {
                self.cars.remove(&car);
            }
        }
    }

    /// Keep the lane being driven if it still exists and route again from
    /// its end node; otherwise the car is removed. Returns whether the car
    /// is still around.
    fn repair_route(&mut self, id: CarId) -> bool {
        let Some(car) = self.cars.get(&id) else {
            return false;
        };
        let Some(route) = &car.route else {
            return true;
        };
        if validate_route(&self.network, route) {
            return true;
        }

        let repaired = route
            .destination()
            .and_then(|destination| continue_from_lane(&self.network, route, destination).ok().flatten());

        match repaired {
            Some(route) => {
                debug!("car {} rerouted", id);
                self.stats.rerouted += 1;
                if let Some(car) = self.cars.get_mut(&id) {
                    car.route = Some(route);
                }
                true
            }
            None => {
                debug!("car {} lost its route, removing it", id);
                self.stats.removed += 1;
                self.cars.remove(&id);
                false
            }
        }
    }

    /// Park a car that drove into a lot, if a spot is open to its role
    fn park_at(&mut self, id: CarId, node: NodeId) {
        let Some(entry) = self.network.node(node) else { return };
        if entry.kind() != NodeKind::LotEntry {
            return;
        }
        let (cell, Some(car)) = (entry.cell(), self.cars.get(&id)) else {
            return;
        };
        let role = car.make.role;
        let Some(lot) = self.lots.values_mut().find(|lot| lot.entry_cell == cell) else {
            return;
        };
        match lot.park(role) {
            Some(spot) => debug!("car {} parked in spot {} of lot {:?}", id, spot, lot.id),
            None => debug!("lot {:?} has no free spot for car {}", lot.id, id),
        }
    }

    fn ensure_editable(&self) -> Result<()> {
        if self.is_generating() {
            bail!("the map is still being generated");
        }
        Ok(())
    }

    /// Refresh the road network around `changed` cells, then lights and
    /// routes that may depend on them
    fn after_edit(&mut self, changed: &[Cell]) -> Result<()> {
        self.network.update_cells(&self.tilemap, changed);
        self.sync_lights()?;
        let ids: Vec<CarId> = self.cars.keys().copied().collect();
        for id in ids {
            self.repair_route(id);
        }
        Ok(())
    }

    /// Lay road on `cells`; neighbors are re-tiled to connect
    pub fn place_road(&mut self, cells: &[Cell]) -> Result<Vec<Cell>> {
        self.ensure_editable()?;
        let changed = self
            .tilemap
            .place_road_and_update_buffer(cells)
            .context("failed to place road")?;
        self.after_edit(&changed)?;
        Ok(changed)
    }

    /// Remove the road at `cell`, along with a lot attached to it
    pub fn remove_road_at(&mut self, cell: Cell) -> Result<()> {
        self.ensure_editable()?;
        let removal = self
            .tilemap
            .remove_road_at(&cell)
            .with_context(|| format!("no road to remove at {}", cell))?;
        if let Some(lot) = removal.detached_lot {
            self.lots.remove(&lot);
            debug!("lot {:?} removed with road at {}", lot, cell);
        }
        self.after_edit(&removal.changed)
    }

    /// Attach a lot next to the road cell `entry`
    pub fn add_lot_by_entry_cell(&mut self, entry: Cell, definition: LotDefinition) -> Result<LotId> {
        self.ensure_editable()?;
        let id = LotId(self.next_lot_id);
        let changed = self
            .tilemap
            .place_lot(&entry, definition.tile, definition.driveway, id)
            .with_context(|| format!("cannot attach {} lot at {}", definition.name, entry))?;
        self.next_lot_id += 1;
        self.lots.insert(id, Lot::new(id, definition, entry));
        self.after_edit(&changed)?;
        Ok(id)
    }

    /// Request a traffic light on `cell`; returns whether it is active
    pub fn add_traffic_light(&mut self, cell: Cell) -> Result<bool> {
        self.requested_lights.insert(cell);
        let active = self.network.add_traffic_light(cell);
        self.sync_lights()?;
        Ok(active)
    }

    /// Spawn a car routed from `from` to `to`, with its rear on the lane
    /// leaving `from`
    pub fn spawn_car(&mut self, from: NodeId, to: NodeId, make: CarMake) -> Result<CarId> {
        let car = self.routed_car(from, to, make)?;
        let id = car.id;
        self.cars.insert(id, car);
        self.stats.spawned += 1;
        debug!("spawned car {} from node {} to node {}", id, from, to);
        Ok(id)
    }

    fn routed_car(&mut self, from: NodeId, to: NodeId, make: CarMake) -> Result<Car> {
        let mut route = create_route(&self.network, from, to)
            .with_context(|| format!("no route from node {} to node {}", from, to))?;
        let first_lane = route
            .current_edge()
            .and_then(|(a, b)| self.network.lane(a, b))
            .with_context(|| format!("route from node {} to node {} is empty", from, to))?;
        route.progress = (make.length / 2.0).min(first_lane.length);
        let start = self.network.node(from).map(|node| node.position).unwrap_or_default();
        let id = self.next_car_id();
        Ok(Car::new(id, make, start, 0.0).routed(route, &self.network))
    }

    /// Give an existing car a new destination. A car on a lane finishes
    /// that lane before following the new path. On failure the car is
    /// left idle where it is.
    pub fn route_car(&mut self, id: CarId, to: NodeId) -> Result<()> {
        let car = self.cars.get_mut(&id).with_context(|| format!("unknown car {}", id))?;
        let continued = match &car.route {
            Some(route) => continue_from_lane(&self.network, route, to),
            None => Ok(None),
        };
        match continued {
            Ok(Some(route)) => {
                car.route = Some(route);
                car.status = CarStatus::Moving;
                return Ok(());
            }
            Ok(None) => {}
            Err(failure) => {
                car.route = None;
                car.velocity = 0.0;
                car.status = CarStatus::Idle;
                return Err(failure).with_context(|| format!("car {} left idle", id));
            }
        }

        let from = match car.route.as_ref().and_then(Route::next_node) {
            Some(node) => node,
            None => {
                let cell = self.network.grid().cell_at_position(&car.position);
                let nearest = self
                    .network
                    .nodes()
                    .filter(|node| Some(node.cell()) == cell && node.kind().is_entry())
                    .min_by(|a, b| {
                        a.position
                            .distance(&car.position)
                            .total_cmp(&b.position.distance(&car.position))
                    })
                    .map(|node| node.id);
                nearest.with_context(|| format!("car {} is not on a road", id))?
            }
        };
        match create_route(&self.network, from, to) {
            Ok(route) => {
                *car = car.clone().routed(route, &self.network);
                Ok(())
            }
            Err(failure) => {
                car.route = None;
                car.velocity = 0.0;
                car.status = CarStatus::Idle;
                Err(failure).with_context(|| format!("car {} left idle", id))
            }
        }
    }

    /// Spawn up to `count` cars between random nodes, skipping spots where
    /// a new car would touch an existing one. Returns how many spawned.
    pub fn spawn_random_cars(&mut self, count: usize) -> usize {
        let starts: Vec<NodeId> = self
            .network
            .nodes()
            .filter(|node| matches!(node.kind(), NodeKind::LaneEntry | NodeKind::DeadendEntry | NodeKind::LotExit))
            .map(|node| node.id)
            .collect();
        let destinations: Vec<NodeId> = self
            .network
            .nodes()
            .filter(|node| matches!(node.kind(), NodeKind::LaneExit | NodeKind::DeadendExit | NodeKind::LotEntry))
            .map(|node| node.id)
            .collect();
        let makes = CarMake::catalog();

        let mut spawned = 0;
        let mut attempts = 0;
        while spawned < count && attempts < count * 20 {
            attempts += 1;
            let (Some(from), Some(to), Some(make)) = (
                self.choose_random(&starts).copied(),
                self.choose_random(&destinations).copied(),
                self.choose_random(&makes).cloned(),
            ) else {
                break;
            };
            let Ok(car) = self.routed_car(from, to, make) else {
                continue;
            };
            if !car.is_routed() || self.touches_any(&car) {
                continue;
            }
            self.cars.insert(car.id, car);
            self.stats.spawned += 1;
            spawned += 1;
        }
        if spawned < count {
            warn!("spawned {} of {} requested cars", spawned, count);
        }
        spawned
    }

    fn touches_any(&self, car: &Car) -> bool {
        let margin = self.config.traffic.safety_margin;
        self.cars.values().any(|other| {
            let gap = segment_distance(&car.rear(), &car.front(), &other.rear(), &other.front());
            gap < car.radius() + other.radius() + margin
        })
    }

    /// Print a summary of the world state
    pub fn print_summary(&self) {
        let stats = &self.stats;
        println!("=== Traffic Simulation Summary ===");
        println!("Time: {:.2}s", self.time);
        println!(
            "Road cells: {}, Nodes: {}, Lanes: {}",
            self.tilemap.road_cells().len(),
            self.network.node_count(),
            self.network.lane_count()
        );
        println!("Traffic lights: {}", self.lights.len());
        println!(
            "Lots: {}, parked cars: {}",
            self.lots.len(),
            self.lots.values().map(Lot::parked).sum::<usize>()
        );
        println!("Active cars: {}", self.cars.len());
        println!("Total cars spawned: {}", stats.spawned);
        println!("Arrived: {}", stats.arrived);
        println!("Stuck: {}", stats.stuck);
        println!("Removed after edits: {}", stats.removed);
        println!("Rerouted: {}", stats.rerouted);
        println!("Success rate: {:.1}%", stats.success_rate());

        if !self.cars.is_empty() {
            println!("--- Active Cars ---");
            for car in self.cars.values() {
                println!(
                    "  Car {} ({}): {:?}, speed={:.1}, position=({:.1}, {:.1})",
                    car.id, car.make.name, car.status, car.velocity, car.position.x, car.position.y
                );
            }
        }
    }

    /// Draw the map in the terminal, one character per cell, with `c`
    /// marking cells that hold a car
    pub fn draw_map(&self) {
        let grid = *self.tilemap().grid();
        let mut rows: Vec<Vec<char>> = self
            .tilemap()
            .render()
            .lines()
            .map(|line| line.chars().collect())
            .collect();
        for car in self.cars.values() {
            let Some(cell) = grid.cell_at_position(&car.position) else {
                continue;
            };
            let (col, row) = ((cell.x - 1) as usize, (cell.y - 1) as usize);
            if let Some(glyph) = rows.get_mut(row).and_then(|r| r.get_mut(col)) {
                *glyph = 'c';
            }
        }

        println!("\n=== World Map ===");
        println!("Legend: +|-o=Road, L=Lot entry, #=Lot/park, *=Nature, .=Grass, c=Car");
        println!();
        for row in rows {
            println!("{}", row.into_iter().collect::<String>());
        }
        println!();
    }
}

/// Route that keeps the lane `route` is on, at the same progress, and
/// continues from that lane's end to `destination`. `None` when the car
/// has no lane left to keep.
fn continue_from_lane(
    network: &RoadNetwork,
    route: &Route,
    destination: NodeId,
) -> Result<Option<Route>, RoutingFailure> {
    let Some((from, to)) = route.current_edge() else {
        return Ok(None);
    };
    if !network.has_lane(from, to) {
        return Ok(None);
    }
    let mut nodes = vec![from];
    if to == destination {
        nodes.push(to);
    } else {
        nodes.extend(find_path(network, to, destination)?.nodes);
    }
    Ok(Some(Route {
        nodes,
        current: 0,
        progress: route.progress,
    }))
}
