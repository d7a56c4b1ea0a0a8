//! # TRUESHOT Shared
//!
//! Common types used by both client and server.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER depend on the networking or engine layers.
//! It holds plain data: math types, tuning constants and configuration.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod constants;
pub mod error;
pub mod math;

pub use config::{BufferMode, CompensationConfig};
pub use error::{ConfigError, ConfigResult};
pub use math::{Rotator, Vec3};
