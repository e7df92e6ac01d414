//! Wayfarer library
//!
//! Image lookups with attribution across several providers, country and city
//! basics, and weather, each behind a TTL cache. The binary in `main.rs` is a thin
//! command-line front end; the modules are public for integration tests and reuse.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod geo;
mod http;
pub mod media;
pub mod weather;
