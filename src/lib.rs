//! Arc Forces - Force-level tactical AI for tick-driven strategy simulations

pub mod ai;
pub mod core;
pub mod map;
pub mod player;
pub mod units;
pub mod world;
