//! # Power Level Source
//!
//! Samples the battery charge from a [`PowerProvider`] and formats it as
//! `Battery percentage = <n>%`.
//!
//! Providers report a fraction in `[0, 1]`; any negative value means the
//! level is unknown, which makes the sample unavailable.

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use super::{Observation, SampleSource, SourceKind};
use crate::error::{RelayError, Result};

/// Fraction reported when the level cannot be read
pub const UNKNOWN_LEVEL: f64 = -1.0;

/// Platform power subsystem
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PowerProvider: Send + Sync {
    /// Battery charge in `[0, 1]`, or a negative value when unknown
    async fn current_level_fraction(&self) -> f64;
}

/// Reads the Linux power-supply class `capacity` attribute (0-100)
#[derive(Debug, Clone)]
pub struct SysfsBatteryProvider {
    capacity_file: PathBuf,
}

impl SysfsBatteryProvider {
    pub fn new(capacity_file: impl Into<PathBuf>) -> Self {
        Self {
            capacity_file: capacity_file.into(),
        }
    }
}

#[async_trait]
impl PowerProvider for SysfsBatteryProvider {
    async fn current_level_fraction(&self) -> f64 {
        let raw = match tokio::fs::read_to_string(&self.capacity_file).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!(path = %self.capacity_file.display(), "Battery capacity unreadable: {}", e);
                return UNKNOWN_LEVEL;
            }
        };

        match raw.trim().parse::<u8>() {
            Ok(percent) if percent <= 100 => f64::from(percent) / 100.0,
            _ => {
                debug!(value = raw.trim(), "Battery capacity out of range");
                UNKNOWN_LEVEL
            }
        }
    }
}

/// Provider returning a fixed fraction
#[derive(Debug, Clone, Copy)]
pub struct StaticPowerProvider {
    fraction: f64,
}

impl StaticPowerProvider {
    pub const fn new(fraction: f64) -> Self {
        Self { fraction }
    }
}

#[async_trait]
impl PowerProvider for StaticPowerProvider {
    async fn current_level_fraction(&self) -> f64 {
        self.fraction
    }
}

/// Convert a charge fraction into a whole percentage
///
/// Returns `None` for unknown (negative) or non-finite fractions. The
/// result is truncated toward zero and clamped to 100.
pub fn level_percent(fraction: f64) -> Option<u8> {
    if !fraction.is_finite() || fraction < 0.0 {
        return None;
    }
    Some((fraction * 100.0).min(100.0) as u8)
}

/// [`SampleSource`] producing battery percentage observations
#[derive(Clone)]
pub struct PowerLevelSource {
    provider: Arc<dyn PowerProvider>,
}

impl PowerLevelSource {
    pub fn new(provider: Arc<dyn PowerProvider>) -> Self {
        Self { provider }
    }
}

impl fmt::Debug for PowerLevelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PowerLevelSource").finish_non_exhaustive()
    }
}

#[async_trait]
impl SampleSource for PowerLevelSource {
    fn kind(&self) -> SourceKind {
        SourceKind::PowerLevel
    }

    async fn sample(&self) -> Result<Observation> {
        let fraction = self.provider.current_level_fraction().await;
        let percent = level_percent(fraction)
            .ok_or(RelayError::SourceUnavailable(SourceKind::PowerLevel.label()))?;

        Ok(Observation::now(
            SourceKind::PowerLevel,
            format!("Battery percentage = {}%", percent),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_level_percent() {
        assert_eq!(level_percent(0.0), Some(0));
        assert_eq!(level_percent(0.5), Some(50));
        assert_eq!(level_percent(1.0), Some(100));
    }

    #[test]
    fn test_level_percent_truncates() {
        assert_eq!(level_percent(0.879), Some(87));
        assert_eq!(level_percent(0.009), Some(0));
    }

    #[test]
    fn test_level_percent_is_never_negative() {
        for fraction in [0.0, 0.25, 0.75, 1.0] {
            assert!(level_percent(fraction).is_some());
        }
        assert_eq!(level_percent(UNKNOWN_LEVEL), None);
        assert_eq!(level_percent(-0.5), None);
    }

    #[test]
    fn test_level_percent_clamps_and_rejects_non_finite() {
        assert_eq!(level_percent(1.5), Some(100));
        assert_eq!(level_percent(f64::NAN), None);
        assert_eq!(level_percent(f64::INFINITY), None);
    }

    #[tokio::test]
    async fn test_sample_formats_percentage() {
        let mut provider = MockPowerProvider::new();
        provider
            .expect_current_level_fraction()
            .times(1)
            .returning(|| 0.87);

        let source = PowerLevelSource::new(Arc::new(provider));
        let obs = source.sample().await.unwrap();

        assert_eq!(obs.kind, SourceKind::PowerLevel);
        assert_eq!(obs.text, "Battery percentage = 87%");
    }

    #[test]
    fn test_static_provider() {
        let provider = StaticPowerProvider::new(0.3);
        assert_eq!(tokio_test::block_on(provider.current_level_fraction()), 0.3);
    }

    #[test]
    fn test_sample_zero_level() {
        let source = PowerLevelSource::new(Arc::new(StaticPowerProvider::new(0.0)));
        let obs = tokio_test::block_on(source.sample()).unwrap();
        assert_eq!(obs.text, "Battery percentage = 0%");
    }

    #[tokio::test]
    async fn test_sample_unknown_level_is_unavailable() {
        let source = PowerLevelSource::new(Arc::new(StaticPowerProvider::new(UNKNOWN_LEVEL)));
        assert!(matches!(
            source.sample().await,
            Err(RelayError::SourceUnavailable("power level"))
        ));
    }

    #[tokio::test]
    async fn test_sysfs_provider_reads_capacity() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"64\n").unwrap();
        file.flush().unwrap();

        let provider = SysfsBatteryProvider::new(file.path());
        assert_eq!(provider.current_level_fraction().await, 0.64);
    }

    #[tokio::test]
    async fn test_sysfs_provider_missing_file() {
        let provider = SysfsBatteryProvider::new("/nonexistent/BAT9/capacity");
        assert_eq!(provider.current_level_fraction().await, UNKNOWN_LEVEL);
    }

    #[tokio::test]
    async fn test_sysfs_provider_garbage() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"full").unwrap();
        file.flush().unwrap();

        let provider = SysfsBatteryProvider::new(file.path());
        assert_eq!(provider.current_level_fraction().await, UNKNOWN_LEVEL);
    }

    #[tokio::test]
    async fn test_sysfs_provider_over_100() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"150").unwrap();
        file.flush().unwrap();

        let provider = SysfsBatteryProvider::new(file.path());
        assert_eq!(provider.current_level_fraction().await, UNKNOWN_LEVEL);
    }
}
