//! HTTP handlers for gate listings, actions and documentation.

pub mod gate;
pub use gate::*;
