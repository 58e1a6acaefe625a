//! HTTP API.
//!
//! JSON endpoints for the administrator UI, the player join flow and the
//! event ingest coming from the sandbox images.

pub mod types;
pub mod web_server;

pub use web_server::WebServer;
