//! Core primitives: configuration, errors, and path utilities.

pub mod config;
pub mod errors;
pub mod paths;
