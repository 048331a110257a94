//! Application services: the generation pipeline, its queue, and the
//! completion listeners.

pub mod error;
pub mod generator;
pub mod notify;
pub mod queue;
pub mod results;
