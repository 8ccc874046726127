pub mod config;
pub mod convergence;
pub mod errors;
pub mod gates;
pub mod logging;
pub mod orchestrator;
pub mod phase;
pub mod review;
pub mod store;
pub mod ui;
