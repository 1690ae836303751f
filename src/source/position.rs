//! # Position Source
//!
//! Samples the most recent location fix from a [`PositionProvider`] and
//! formats it as a coordinate pair, e.g. `(55.751244, 37.618423)`.
//!
//! Acquiring the fix (permissions, GNSS hardware, network location) is the
//! provider's job. Two providers ship with the crate:
//!
//! - [`FixFileProvider`]: reads a JSON fix written by an external locator
//! - [`StaticPositionProvider`]: a fixed, optional fix

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use super::{Observation, SampleSource, SourceKind};
use crate::error::{RelayError, Result};

/// Decimal places kept when formatting a coordinate
const COORDINATE_PRECISION: usize = 6;

/// A WGS84 latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Whether both components are finite and within their degree ranges
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.prec$}, {:.prec$})",
            self.latitude,
            self.longitude,
            prec = COORDINATE_PRECISION
        )
    }
}

/// Platform location subsystem
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PositionProvider: Send + Sync {
    /// Most recent known fix, or `None` if no fix has been resolved yet
    async fn current_fix(&self) -> Option<Coordinate>;
}

/// Reads the latest fix from a JSON file
///
/// The file holds `{"latitude": <f64>, "longitude": <f64>}` and is
/// rewritten by whatever process owns the GNSS receiver. A missing,
/// unreadable or malformed file means "no fix yet".
#[derive(Debug, Clone)]
pub struct FixFileProvider {
    path: PathBuf,
}

impl FixFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PositionProvider for FixFileProvider {
    async fn current_fix(&self) -> Option<Coordinate> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) => {
                debug!(path = %self.path.display(), "No position fix file: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<Coordinate>(&contents) {
            Ok(fix) if fix.is_valid() => Some(fix),
            Ok(fix) => {
                debug!(?fix, "Ignoring out-of-range position fix");
                None
            }
            Err(e) => {
                debug!(path = %self.path.display(), "Malformed position fix: {}", e);
                None
            }
        }
    }
}

/// Provider returning a fixed (possibly absent) fix
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticPositionProvider {
    fix: Option<Coordinate>,
}

impl StaticPositionProvider {
    pub const fn new(fix: Option<Coordinate>) -> Self {
        Self { fix }
    }
}

#[async_trait]
impl PositionProvider for StaticPositionProvider {
    async fn current_fix(&self) -> Option<Coordinate> {
        self.fix
    }
}

/// [`SampleSource`] producing coordinate-pair observations
#[derive(Clone)]
pub struct PositionSource {
    provider: Arc<dyn PositionProvider>,
}

impl PositionSource {
    pub fn new(provider: Arc<dyn PositionProvider>) -> Self {
        Self { provider }
    }
}

impl fmt::Debug for PositionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PositionSource").finish_non_exhaustive()
    }
}

#[async_trait]
impl SampleSource for PositionSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Position
    }

    async fn sample(&self) -> Result<Observation> {
        let fix = self
            .provider
            .current_fix()
            .await
            .ok_or(RelayError::SourceUnavailable(SourceKind::Position.label()))?;

        Ok(Observation::now(SourceKind::Position, fix.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_coordinate_display() {
        let fix = Coordinate::new(55.751244, 37.618423);
        assert_eq!(fix.to_string(), "(55.751244, 37.618423)");
    }

    #[test]
    fn test_coordinate_display_pads_precision() {
        assert_eq!(Coordinate::new(-33.5, 0.0).to_string(), "(-33.500000, 0.000000)");
    }

    #[test]
    fn test_coordinate_validity() {
        assert!(Coordinate::new(90.0, -180.0).is_valid());
        assert!(!Coordinate::new(90.1, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, 180.5).is_valid());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
    }

    #[tokio::test]
    async fn test_sample_formats_fix() {
        let mut provider = MockPositionProvider::new();
        provider
            .expect_current_fix()
            .times(1)
            .returning(|| Some(Coordinate::new(48.858370, 2.294481)));

        let source = PositionSource::new(Arc::new(provider));
        let obs = source.sample().await.unwrap();

        assert_eq!(obs.kind, SourceKind::Position);
        assert_eq!(obs.text, "(48.858370, 2.294481)");
    }

    #[tokio::test]
    async fn test_sample_without_fix_is_unavailable() {
        let mut provider = MockPositionProvider::new();
        provider.expect_current_fix().returning(|| None);

        let source = PositionSource::new(Arc::new(provider));
        match source.sample().await {
            Err(RelayError::SourceUnavailable(label)) => assert_eq!(label, "position"),
            other => panic!("Expected SourceUnavailable, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticPositionProvider::new(Some(Coordinate::new(1.0, 2.0)));
        assert_eq!(provider.current_fix().await, Some(Coordinate::new(1.0, 2.0)));
        assert_eq!(StaticPositionProvider::default().current_fix().await, None);
    }

    #[tokio::test]
    async fn test_fix_file_provider_reads_fix() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{"latitude": 59.9375, "longitude": 30.308611}"#)
            .unwrap();
        file.flush().unwrap();

        let provider = FixFileProvider::new(file.path());
        assert_eq!(
            provider.current_fix().await,
            Some(Coordinate::new(59.9375, 30.308611))
        );
    }

    #[tokio::test]
    async fn test_fix_file_provider_missing_file() {
        let provider = FixFileProvider::new("/nonexistent/fix.json");
        assert_eq!(provider.current_fix().await, None);
    }

    #[tokio::test]
    async fn test_fix_file_provider_malformed_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"latitude=1").unwrap();
        file.flush().unwrap();

        let provider = FixFileProvider::new(file.path());
        assert_eq!(provider.current_fix().await, None);
    }

    #[tokio::test]
    async fn test_fix_file_provider_out_of_range() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{"latitude": 123.0, "longitude": 0.0}"#).unwrap();
        file.flush().unwrap();

        let provider = FixFileProvider::new(file.path());
        assert_eq!(provider.current_fix().await, None);
    }
}
