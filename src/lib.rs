pub mod chart;
pub mod config;
pub mod pasa;
pub mod pipeline;
pub mod report;
pub mod telemetry;
