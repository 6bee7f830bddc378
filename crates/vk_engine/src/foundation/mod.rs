//! Foundation module - core utilities shared by the renderer
//!
//! - Math types and projection helpers
//! - Logging setup
//! - Frame timing

pub mod logging;
pub mod math;
pub mod time;
