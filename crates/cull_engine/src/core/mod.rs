//! Core engine systems
//!
//! Contains the unified configuration system that replaces ambient global
//! state: capacity constants and worker-pool sizing are explicit values
//! constructed at startup and passed into the pipeline.

pub mod config;
