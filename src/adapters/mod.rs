//! Adapters - implementations of port interfaces.

pub mod ai;
