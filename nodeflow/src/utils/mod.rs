//! Utility functions for ids, hashing, encoding and timestamps.

pub mod base64_bytes;
mod ids;
pub mod timestamps;

pub use ids::{content_id, generate_run_id};
pub use timestamps::{elapsed_ms, format_iso8601, iso_timestamp, Timestamp};
