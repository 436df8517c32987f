//! Request extractors.

pub mod gate_input;

pub use gate_input::GateInput;
