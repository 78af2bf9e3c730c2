//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by every crate in the workspace:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate establishes the logging conventions, the validated
//! [`CoreConfig`](config::CoreConfig) consumed by the composition root, and the
//! broadcast channel used to tell the host that local data changed.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
