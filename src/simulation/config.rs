//! Tunables for generation, road geometry and traffic behaviour
//!
//! Everything here is plain data threaded through the simulation
//! explicitly; nothing reads ambient global state.

/// Side length of one tile in world units (metres)
pub const TILE_SIZE: f32 = 16.0;

/// Distance from a tile edge to the lane nodes on that edge
pub const NODE_INSET: f32 = 1.0;

/// Distance from the tile centre line to the centre of a lane
pub const LANE_OFFSET: f32 = 4.0;

/// Durations of a traffic light cycle. Red always lasts green + yellow so
/// that crossing approaches alternate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrafficLightTimers {
    pub green: f32,
    pub yellow: f32,
}

impl TrafficLightTimers {
    pub fn red(&self) -> f32 {
        self.green + self.yellow
    }
}

impl Default for TrafficLightTimers {
    fn default() -> Self {
        Self {
            green: 8.0,
            yellow: 2.0,
        }
    }
}

/// Steering and rule engine parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrafficConfig {
    /// Seconds of travel covered by a car's projected path
    pub horizon_time: f32,
    /// Lower bound for the projected path length
    pub min_horizon: f32,
    /// Upper bound for the projected path length
    pub max_horizon: f32,
    /// Spacing between samples of a projected path
    pub path_step: f32,
    /// Clearance kept between car bodies
    pub safety_margin: f32,
    /// How far ahead signals and yield lanes are considered
    pub signal_lookahead: f32,
    /// Priority traffic closer in time than this forces a yield
    pub yield_time_threshold: f32,
    /// Radius of the neighbor query per car
    pub neighbor_radius: f32,
    /// Cars stopped at least this long are removed from the map
    pub max_wait_time: f32,
    /// Speed at which cars roll onto their destination node
    pub arrival_speed: f32,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            horizon_time: 2.0,
            min_horizon: 10.0,
            max_horizon: 30.0,
            path_step: 1.0,
            safety_margin: 0.5,
            signal_lookahead: 2.0 * TILE_SIZE,
            yield_time_threshold: 3.0,
            neighbor_radius: 48.0,
            max_wait_time: 60.0,
            arrival_speed: 2.0,
        }
    }
}

/// Pacing of the tile generator when driven from the tick loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationConfig {
    /// Propagation steps executed per simulated second
    pub steps_per_second: f32,
    /// Fresh seeds tried before generation gives up
    pub max_attempts: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            steps_per_second: 2000.0,
            max_attempts: 8,
        }
    }
}

/// Top-level simulation configuration
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SimulationConfig {
    pub lights: TrafficLightTimers,
    pub traffic: TrafficConfig,
    pub generation: GenerationConfig,
    pub seed: u64,
}

impl SimulationConfig {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }
}
