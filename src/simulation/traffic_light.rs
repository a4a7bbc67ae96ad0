//! Traffic lights on intersection approaches
//!
//! Each controlled approach node gets its own light. Horizontal approaches
//! start on green and vertical ones on red; red lasts as long as green and
//! yellow together, so crossing approaches alternate.

use log::debug;

use super::cell::Cell;
use super::config::TrafficLightTimers;
use super::fsm::{Fsm, FsmBuilder, FsmError};
use super::types::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightPhase {
    Green,
    Yellow,
    Red,
}

impl LightPhase {
    pub fn next(self) -> LightPhase {
        match self {
            LightPhase::Green => LightPhase::Yellow,
            LightPhase::Yellow => LightPhase::Red,
            LightPhase::Red => LightPhase::Green,
        }
    }

    pub fn duration(self, timers: &TrafficLightTimers) -> f32 {
        match self {
            LightPhase::Green => timers.green,
            LightPhase::Yellow => timers.yellow,
            LightPhase::Red => timers.red(),
        }
    }
}

/// What cars on an approach see
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Go,
    Caution,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficLightAction {
    SetSignal { node: NodeId, signal: Signal },
}

#[derive(Debug, Clone)]
pub struct TrafficLight {
    pub cell: Cell,
    pub node: NodeId,
    fsm: Fsm<LightPhase, TrafficLightAction>,
}

impl TrafficLight {
    pub fn new(cell: Cell, node: NodeId, horizontal: bool, timers: &TrafficLightTimers) -> Result<Self, FsmError> {
        let set = |signal| vec![TrafficLightAction::SetSignal { node, signal }];
        let initial = if horizontal {
            LightPhase::Green
        } else {
            LightPhase::Red
        };
        let fsm = FsmBuilder::new()
            .state(LightPhase::Green, set(Signal::Go), vec![])
            .state(LightPhase::Yellow, set(Signal::Caution), vec![])
            .state(LightPhase::Red, set(Signal::Stop), vec![])
            .timed(LightPhase::Green, timers.green, LightPhase::Yellow)
            .timed(LightPhase::Yellow, timers.yellow, LightPhase::Red)
            .timed(LightPhase::Red, timers.red(), LightPhase::Green)
            .build(initial)?;
        Ok(Self { cell, node, fsm })
    }

    pub fn phase(&self) -> LightPhase {
        self.fsm.current()
    }

    pub fn signal(&self) -> Signal {
        match self.phase() {
            LightPhase::Green => Signal::Go,
            LightPhase::Yellow => Signal::Caution,
            LightPhase::Red => Signal::Stop,
        }
    }

    /// Seconds spent in the current phase
    pub fn elapsed(&self) -> f32 {
        self.fsm.elapsed()
    }

    /// Actions that bring the approach signal in line with the current phase
    pub fn sync(&self) -> Vec<TrafficLightAction> {
        self.fsm.entry_actions()
    }

    pub fn update(&mut self, delta: f32) -> Vec<TrafficLightAction> {
        let before = self.phase();
        let actions = self.fsm.update(delta);
        if self.phase() != before {
            debug!("light {} at {}: {:?} -> {:?}", self.node, self.cell, before, self.phase());
        }
        actions
    }

    /// Switch to red right away
    pub fn force_red(&mut self) -> Result<Vec<TrafficLightAction>, FsmError> {
        self.fsm.transition_to(LightPhase::Red)
    }
}
