//! Sessions module entities

pub mod model;

pub use model::*;
