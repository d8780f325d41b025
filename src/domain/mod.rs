//! Domain types for BOQ generation.

pub mod boq;
pub mod parameters;
pub mod snapshot;
