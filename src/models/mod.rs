//! Accelerometer measurement model.
//!
//! The model is implemented as small, pure functions plus one evaluator type so
//! that the fitting code can stay generic over the axis mode.

pub mod model;

pub use model::*;
