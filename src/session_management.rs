//! Session lifecycle subsystem.
//!
//! Creates sessions, drives their status transitions and tears down their
//! containers once they complete.

pub mod session_manager;

pub use session_manager::{CreateSessionRequest, SessionManager};
