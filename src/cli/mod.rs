//! CLI-specific utilities for a2b
//!
//! This module contains code specific to the command-line interface,
//! separate from the core library functionality.

pub mod picker;
pub mod progress;

pub use picker::{pick_file, pick_mode, Mode};
pub use progress::ProgressManager;
