//! Pure data and validation shared by the run loop and tools.
//!
//! Nothing here performs I/O; everything is deterministic and unit tested in
//! isolation.

pub mod errors;
pub mod image;
pub mod message;
pub mod property;
pub mod prompt;
pub mod response;
pub mod results;
