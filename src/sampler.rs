//! # Sampler
//!
//! Drives one [`SampleSource`] on a fixed repeating interval and feeds every
//! observation it produces into an [`ObservationSink`].
//!
//! Each sampler runs on its own Tokio task with its own interval timer. The
//! first tick fires immediately at start. A tick whose source is unavailable
//! is skipped silently (logged at debug level).
//!
//! Stopping is synchronous from the caller's point of view: [`Sampler::stop`]
//! signals the task and waits for it to exit, so once it returns nothing
//! more will be appended. A sample that is still being taken when the stop
//! signal arrives is abandoned rather than awaited.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::source::{Observation, SampleSource, SourceKind};

/// Shortest timer period a sampler runs with
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Destination for sampled observations
pub trait ObservationSink: Send + Sync {
    fn append(&self, observation: Observation);
}

/// Tick counters for one sampler run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    /// Timer fires whose sample completed
    pub ticks: u64,
    /// Observations handed to the sink
    pub appended: u64,
    /// Ticks skipped because the source had nothing
    pub skipped: u64,
}

/// A running periodic sampler
///
/// Dropping the handle without calling [`stop`](Sampler::stop) also ends the
/// task, at its next scheduling point.
#[derive(Debug)]
pub struct Sampler {
    kind: SourceKind,
    interval: Duration,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<SamplerStats>,
}

impl Sampler {
    /// Start sampling `source` every `interval`, feeding `sink`
    ///
    /// Must be called from within a Tokio runtime. An `interval` shorter
    /// than [`MIN_PERIOD`] is raised to it.
    pub fn start(
        interval: Duration,
        source: Arc<dyn SampleSource>,
        sink: Arc<dyn ObservationSink>,
    ) -> Self {
        let kind = source.kind();
        let interval = if interval < MIN_PERIOD {
            warn!(%kind, requested = ?interval, "Sampling interval below {:?}, clamping", MIN_PERIOD);
            MIN_PERIOD
        } else {
            interval
        };
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(interval, source, sink, shutdown_rx));

        info!(%kind, ?interval, "Sampler started");

        Self {
            kind,
            interval,
            shutdown,
            task,
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the sampler task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the timer and wait for the task to exit
    ///
    /// A tick whose sample is still pending is not allowed to finish: its
    /// sample future is dropped, nothing from it reaches the sink, and it is
    /// not counted in [`SamplerStats::ticks`]. This keeps `stop` from
    /// waiting on a slow source.
    pub async fn stop(self) -> SamplerStats {
        // The task may already be gone; the join below still reports it.
        let _ = self.shutdown.send(());

        match self.task.await {
            Ok(stats) => {
                info!(kind = %self.kind, ticks = stats.ticks, appended = stats.appended, "Sampler stopped");
                stats
            }
            Err(e) => {
                warn!(kind = %self.kind, "Sampler task ended abnormally: {}", e);
                SamplerStats::default()
            }
        }
    }
}

async fn run(
    interval: Duration,
    source: Arc<dyn SampleSource>,
    sink: Arc<dyn ObservationSink>,
    mut shutdown: oneshot::Receiver<()>,
) -> SamplerStats {
    let kind = source.kind();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut stats = SamplerStats::default();

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => break,

            _ = ticker.tick() => {
                let sample = tokio::select! {
                    biased;
                    _ = &mut shutdown => break,
                    sample = source.sample() => sample,
                };
                stats.ticks += 1;

                match sample {
                    Ok(observation) => {
                        sink.append(observation);
                        stats.appended += 1;
                    }
                    Err(e) => {
                        debug!(%kind, "Skipping tick: {}", e);
                        stats.skipped += 1;
                    }
                }
            }
        }
    }

    stats
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Sink that keeps every observation it receives
    #[derive(Clone, Default)]
    pub struct RecordingSink {
        pub items: Arc<Mutex<Vec<Observation>>>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn texts(&self) -> Vec<String> {
            self.items
                .lock()
                .unwrap()
                .iter()
                .map(|obs| obs.text.clone())
                .collect()
        }

        pub fn len(&self) -> usize {
            self.items.lock().unwrap().len()
        }
    }

    impl ObservationSink for RecordingSink {
        fn append(&self, observation: Observation) {
            self.items.lock().unwrap().push(observation);
        }
    }
}
