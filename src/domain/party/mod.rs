//! Remote parties this node peers with

pub mod model;

pub use model::*;
