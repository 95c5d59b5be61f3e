//! Download scheduling

pub mod orchestrator;

pub use orchestrator::{Orchestrator, SchedulerConfig};
