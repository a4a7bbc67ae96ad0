//! Tile Traffic Library
//!
//! A tile-based city simulation: a constraint-propagation tile generator, a
//! road network derived from the finished tilemap, and vehicles that route
//! over it under traffic rules. Runs headless; rendering is left to callers.

pub mod simulation;
