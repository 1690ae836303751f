//! # Session Controller
//!
//! Owns the sampling lifecycle: two samplers (position, power level) feeding
//! one shared [`Buffer`].
//!
//! ## States
//!
//! | State | `start()` | `stop()` |
//! |-------|-----------|----------|
//! | Idle | spawn both samplers, go Running | no-op |
//! | Running | no-op | stop both samplers, discard buffer, go Idle |
//!
//! Neither call ever fails: sampling and upload problems end in log events.
//! Unflushed observations are dropped on stop, not uploaded. Uploads already
//! dispatched keep running.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::buffer::Buffer;
use crate::config::{Config, SessionConfig};
use crate::error::Result;
use crate::sampler::{ObservationSink, Sampler, SamplerStats};
use crate::source::{
    FixFileProvider, PositionProvider, PositionSource, PowerLevelSource, SampleSource,
    StaticPositionProvider, SysfsBatteryProvider,
};
use crate::upload::{BatchUploader, HttpUploader};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
}

/// The pair of samplers alive while Running
#[derive(Debug)]
struct ActiveSamplers {
    position: Sampler,
    power: Sampler,
}

/// Start/stop owner of both samplers and the buffer
pub struct SessionController {
    config: SessionConfig,
    position: Arc<dyn SampleSource>,
    power: Arc<dyn SampleSource>,
    buffer: Arc<Buffer>,
    active: Mutex<Option<ActiveSamplers>>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("config", &self.config)
            .field("buffer", &self.buffer)
            .finish_non_exhaustive()
    }
}

impl SessionController {
    /// Create an idle controller
    ///
    /// The buffer is created here, empty, and lives as long as the controller.
    pub fn new(
        config: SessionConfig,
        position: Arc<dyn SampleSource>,
        power: Arc<dyn SampleSource>,
        uploader: Arc<dyn BatchUploader>,
    ) -> Self {
        let buffer = Arc::new(Buffer::new(config.max_items, uploader));
        Self {
            config,
            position,
            power,
            buffer,
            active: Mutex::new(None),
        }
    }

    /// Build a controller with the platform providers and HTTP uploader
    /// described by `config`
    ///
    /// # Errors
    ///
    /// Returns error if the upload endpoint is invalid.
    pub fn from_config(config: &Config) -> Result<Self> {
        let position_provider: Arc<dyn PositionProvider> = match &config.position.fix_file {
            Some(path) => Arc::new(FixFileProvider::new(path)),
            None => Arc::new(StaticPositionProvider::default()),
        };
        let power_provider = Arc::new(SysfsBatteryProvider::new(&config.power.capacity_file));
        let uploader = Arc::new(HttpUploader::from_config(&config.upload)?);

        Ok(Self::new(
            config.session(),
            Arc::new(PositionSource::new(position_provider)),
            Arc::new(PowerLevelSource::new(power_provider)),
            uploader,
        ))
    }

    /// Begin sampling
    ///
    /// Returns `true` if the session went from Idle to Running, `false` if it
    /// was already running. Must be called from within a Tokio runtime.
    pub async fn start(&self) -> bool {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return false;
        }

        let sink: Arc<dyn ObservationSink> = self.buffer.clone();
        *active = Some(ActiveSamplers {
            position: Sampler::start(
                self.config.position_interval,
                Arc::clone(&self.position),
                Arc::clone(&sink),
            ),
            power: Sampler::start(self.config.power_interval, Arc::clone(&self.power), sink),
        });

        info!(
            position_interval = ?self.config.position_interval,
            power_interval = ?self.config.power_interval,
            max_items = self.config.max_items,
            url = %self.config.url,
            "Session started"
        );
        true
    }

    /// Stop sampling and discard whatever is still buffered
    ///
    /// Returns `true` if the session went from Running to Idle, `false` if it
    /// was already idle. When this returns, no sampler tick can append to the
    /// buffer any more.
    pub async fn stop(&self) -> bool {
        let mut active = self.active.lock().await;
        let Some(samplers) = active.take() else {
            return false;
        };

        let (position, power): (SamplerStats, SamplerStats) =
            tokio::join!(samplers.position.stop(), samplers.power.stop());
        let discarded = self.buffer.clear();

        info!(
            position_samples = position.appended,
            power_samples = power.appended,
            discarded,
            "Session stopped"
        );
        true
    }

    pub async fn state(&self) -> SessionState {
        if self.active.lock().await.is_some() {
            SessionState::Running
        } else {
            SessionState::Idle
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state().await == SessionState::Running
    }

    /// The shared buffer
    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}
