//! Attacker container pool.
//!
//! Provisions player/team sandboxes, tracks their occupancy and releases
//! them when a session ends.

pub mod pool;

pub use pool::ContainerPool;
