//! Storage subsystem.
//!
//! Persists sessions, levels, attacker containers, users and the append-only
//! gameplay event log in SQLite. The schema is created on open.
//!
//! Components:
//! - `types`: domain records shared by every subsystem.
//! - `database`: the async sqlx-backed store.

pub mod database;
pub mod types;

pub use database::Database;
pub use types::{
    ContainerRecord, ContainerStatus, EventType, GameEvent, Level, Session, SessionStatus, User,
};
