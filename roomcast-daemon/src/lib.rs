//! Roomcast node daemon library
//!
//! This module re-exports the daemon's modules for integration testing.

pub mod config;
pub mod protocol;
pub mod server;
pub mod socket_utils;
