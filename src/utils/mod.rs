//! Utility functions and helpers
//!
//! This module contains timestamp utilities and time-string parsing.

pub mod time;

pub use time::{format_age, format_timestamp, now_millis, parse_duration};
