//! Shared infrastructure for exportd components.
//!
//! Currently this crate hosts the logging configuration used by the server
//! binary (and by any future companion tools), so every component logs the
//! same way: `tracing` with env-driven level, format, and output target.

pub mod logging;
