//! hostwatch: sampling and supervision core of a host monitoring agent.
//!
//! This library exposes the core modules for use by the binary and by tests.

pub mod app;
pub mod collectors;
pub mod config;
pub mod controller;
pub mod delta;
pub mod error;
pub mod history;
pub mod model;
pub mod supervisor;
pub mod surface;
