//! Utility functions and helpers for the pestlin-rs library.

pub mod matrix_convert;

pub use matrix_convert::invert;

/// Canonical form of every parameter, observation and group name.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}
