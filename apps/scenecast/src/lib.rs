pub mod adapt;
pub mod cli;
pub mod config;
pub mod display;
pub mod engine;
pub mod media;
pub mod session;
pub mod signaling;
pub mod telemetry;
