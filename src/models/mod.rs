//! Data models: identifiers and wire events.

pub mod event;
pub mod ids;

pub use event::*;
pub use ids::*;
