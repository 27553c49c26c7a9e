//! Bootstrap module for starting the relay
//!
//! This module handles:
//! - Configuration loading
//! - Storage backend selection and service wiring

pub mod config;
pub mod services;

pub use config::load_config;
pub use services::{init_services, Services};
