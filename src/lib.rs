pub mod artifact;
pub mod capsule;
pub mod config;
pub mod errors;
pub mod gates;
pub mod ingest;
pub mod logging;
pub mod orchestrator;
pub mod phase;
pub mod recovery;
pub mod session;
pub mod ui;
