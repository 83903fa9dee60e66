//! Shared building blocks
//!
//! Math aliases and helpers, typed arena keys and the logging entry points every
//! other module builds on.

pub mod collections;
pub mod logging;
pub mod math;
