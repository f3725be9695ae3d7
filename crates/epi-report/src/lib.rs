pub mod config;
pub mod error;
pub mod surveillance;
pub mod telemetry;
