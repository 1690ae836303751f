//! # Sample Sources
//!
//! A [`SampleSource`] produces one formatted [`Observation`] on demand, or
//! reports that it has nothing to say right now.
//!
//! This module handles:
//! - The observation record shared by every source
//! - Device position sampling ([`position`])
//! - Battery level sampling ([`power`])

pub mod position;
pub mod power;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::error::Result;

pub use position::{Coordinate, FixFileProvider, PositionProvider, PositionSource, StaticPositionProvider};
pub use power::{PowerLevelSource, PowerProvider, StaticPowerProvider, SysfsBatteryProvider};

/// Which telemetry source produced an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Position,
    PowerLevel,
}

impl SourceKind {
    /// Short label used in logs and errors
    pub const fn label(self) -> &'static str {
        match self {
            SourceKind::Position => "position",
            SourceKind::PowerLevel => "power level",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One telemetry reading
///
/// Only `text` goes out on the default wire format; `kind` and
/// `captured_at` are emitted when tagged uploads are enabled.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub kind: SourceKind,
    pub captured_at: DateTime<Utc>,
    pub text: String,
}

impl Observation {
    /// Create an observation stamped with the current time
    pub fn now(kind: SourceKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            captured_at: Utc::now(),
            text: text.into(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Capability to produce a single observation on demand
///
/// Returns [`RelayError::SourceUnavailable`](crate::error::RelayError::SourceUnavailable)
/// when no reading can be taken; callers skip the tick in that case.
#[async_trait]
pub trait SampleSource: Send + Sync {
    /// Kind of observation this source produces
    fn kind(&self) -> SourceKind;

    /// Take one reading
    async fn sample(&self) -> Result<Observation>;
}
