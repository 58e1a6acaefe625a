//! Wires the subsystems together and runs the service.

pub mod controller_handler;

pub use controller_handler::Controller;
