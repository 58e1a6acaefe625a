pub mod configuration;
pub mod container_pool;
pub mod controller;
pub mod error_handling;
pub mod join;
pub mod reporting;
pub mod runtime;
pub mod scoring;
pub mod session_management;
pub mod storage;
pub mod web_interface;
