//! Side-effecting collaborators of the run loop: model transports and config.

pub mod config;
pub mod model;
pub mod openai;
