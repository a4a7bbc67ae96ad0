//! Table-driven finite state machine
//!
//! States live in a vector and transitions refer to them by index, so
//! cyclic machines need no self-referential ownership. Timed transitions
//! carry their overshoot into the next state.

use std::fmt::Debug;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FsmError {
    #[error("unknown state {0}")]
    UnknownState(String),
    #[error("state {0} is defined twice")]
    DuplicateState(String),
    #[error("timed transition out of {state} must last longer than zero, got {duration}")]
    InvalidDuration { state: String, duration: f32 },
}

#[derive(Debug, Clone)]
struct StateDef<K, A> {
    key: K,
    on_entry: Vec<A>,
    on_exit: Vec<A>,
    /// Duration and target index
    timeout: Option<(f32, usize)>,
}

/// Collects states and transitions by key; `build` resolves them to indices
#[derive(Debug, Clone)]
pub struct FsmBuilder<K, A> {
    states: Vec<(K, Vec<A>, Vec<A>)>,
    timed: Vec<(K, f32, K)>,
}

impl<K: Copy + PartialEq + Debug, A: Clone> Default for FsmBuilder<K, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy + PartialEq + Debug, A: Clone> FsmBuilder<K, A> {
    pub fn new() -> Self {
        Self {
            states: Vec::new(),
            timed: Vec::new(),
        }
    }

    pub fn state(mut self, key: K, on_entry: Vec<A>, on_exit: Vec<A>) -> Self {
        self.states.push((key, on_entry, on_exit));
        self
    }

    /// Move from `from` to `to` after `duration` seconds in `from`
    pub fn timed(mut self, from: K, duration: f32, to: K) -> Self {
        self.timed.push((from, duration, to));
        self
    }

    pub fn build(self, initial: K) -> Result<Fsm<K, A>, FsmError> {
        let mut states: Vec<StateDef<K, A>> = Vec::with_capacity(self.states.len());
        for (key, on_entry, on_exit) in self.states {
            if states.iter().any(|s| s.key == key) {
                return Err(FsmError::DuplicateState(format!("{:?}", key)));
            }
            states.push(StateDef {
                key,
                on_entry,
                on_exit,
                timeout: None,
            });
        }

        let find = |key: K, states: &[StateDef<K, A>]| {
            states
                .iter()
                .position(|s| s.key == key)
                .ok_or_else(|| FsmError::UnknownState(format!("{:?}", key)))
        };
        for (from, duration, to) in self.timed {
            if duration <= 0.0 {
                return Err(FsmError::InvalidDuration {
                    state: format!("{:?}", from),
                    duration,
                });
            }
            let from = find(from, &states)?;
            let to = find(to, &states)?;
            states[from].timeout = Some((duration, to));
        }

        let current = find(initial, &states)?;
        Ok(Fsm {
            states,
            current,
            elapsed: 0.0,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Fsm<K, A> {
    states: Vec<StateDef<K, A>>,
    current: usize,
    elapsed: f32,
}

impl<K: Copy + PartialEq + Debug, A: Clone> Fsm<K, A> {
    pub fn current(&self) -> K {
        self.states[self.current].key
    }

    /// Seconds spent in the current state
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Seconds left before the current state times out
    pub fn remaining(&self) -> Option<f32> {
        self.states[self.current]
            .timeout
            .map(|(duration, _)| (duration - self.elapsed).max(0.0))
    }

    /// Entry actions of the current state, used to sync on start
    pub fn entry_actions(&self) -> Vec<A> {
        self.states[self.current].on_entry.clone()
    }

    /// Advance time, firing every timed transition that elapses. Returns
    /// exit and entry actions in the order they happened.
    pub fn update(&mut self, delta: f32) -> Vec<A> {
        self.elapsed += delta;
        let mut actions = Vec::new();
        while let Some((duration, target)) = self.states[self.current].timeout {
            if self.elapsed < duration {
                break;
            }
            self.elapsed -= duration;
            self.enter(target, &mut actions);
        }
        actions
    }

    /// Jump straight to `key`, resetting the state timer
    pub fn transition_to(&mut self, key: K) -> Result<Vec<A>, FsmError> {
        let target = self
            .states
            .iter()
            .position(|s| s.key == key)
            .ok_or_else(|| FsmError::UnknownState(format!("{:?}", key)))?;
        let mut actions = Vec::new();
        self.elapsed = 0.0;
        self.enter(target, &mut actions);
        Ok(actions)
    }

    fn enter(&mut self, target: usize, actions: &mut Vec<A>) {
        actions.extend(self.states[self.current].on_exit.iter().cloned());
        self.current = target;
        actions.extend(self.states[self.current].on_entry.iter().cloned());
    }
}
