//! Session lifecycle management
//!
//! This module provides the `SessionController` abstraction that manages:
//! - Capture pipeline lifecycle (start/pause/resume/stop)
//! - Chunk numbering via the sequencer, including addendum continuation
//! - Hand-off of each chunk to the sync engine, in capture order
//! - Session finalization bookkeeping and statistics

mod config;
mod controller;
mod stats;

pub use config::ControllerConfig;
pub use controller::{ControllerState, SessionController, StartMode, StartOptions};
pub use stats::{ControllerStatus, SessionStats};
