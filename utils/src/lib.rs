//! Shared utilities for the Trollar wallet engine.

pub mod logging;

pub use logging::{init_logging, LogFormat};
