//! # Telemetry Relay Library
//!
//! Periodically samples device position and battery level on independent
//! cadences and ships the readings to an HTTP endpoint in batches.
//!
//! Data flows one way:
//!
//! ```text
//! SampleSource -> Sampler (tick) -> Buffer::append -> [len > max_items] -> BatchUploader::send
//! ```
//!
//! [`session::SessionController`] owns the start/stop lifecycle.

pub mod buffer;
pub mod config;
pub mod error;
pub mod sampler;
pub mod session;
pub mod source;
pub mod upload;
