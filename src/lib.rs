pub mod configuration;
pub mod container_management;
pub mod container_runtime;
pub mod controller;
pub mod error_handling;
pub mod matchmaking;
pub mod session_management;
pub mod storage;
pub mod terminal_bridge;
pub mod web_interface;
