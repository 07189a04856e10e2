//! Core library modules for a2b
//!
//! This module contains the internal implementation details of the a2b library.

pub mod config;
pub mod duration;
pub mod error;
pub mod geocoder;
pub mod http;
pub mod model;
pub mod options;
pub mod reconcile;
pub mod router;
pub mod sequencer;
pub mod sheet;

// Re-export main types for internal use
pub use config::ServiceConfig;
pub use reconcile::ReconciliationDriver;
pub use sheet::WorkbookData;
