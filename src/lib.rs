//! Downbeat detection for beat-synchronised video
//!
//! Resolves an audio file, detects its downbeats with the best available
//! strategy, converts them to video frame indices and writes a uniform
//! success/failure record.

pub mod analysis;
pub mod audio;
pub mod backends;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod export;
pub mod resolver;
#[cfg(feature = "spectral")]
pub mod spectral;
pub mod strategy;

pub use analysis::{DetectionEvent, DownbeatSequence, FrameSequence};
pub use config::Config;
pub use error::{DownbeatError, Result as DownbeatResult};
pub use export::{DetectionResult, OutputProfile, ProcessingInfo};
pub use resolver::{AudioReference, FileResolver};
pub use strategy::{Capabilities, ErrorPolicy, Strategy, StrategySelector};

use std::path::Path;
use std::time::Instant;

/// Main processing pipeline: resolve, detect, normalise, serialise
pub struct DownbeatSync {
    config: Config,
    resolver: FileResolver,
    selector: StrategySelector,
}

impl DownbeatSync {
    /// Create a processor resolving relative paths against the working directory
    pub fn new(config: Config, capabilities: Capabilities) -> DownbeatResult<Self> {
        let resolver = FileResolver::from_current_dir(config.resolver.fallback_names.clone())?;
        Ok(Self::with_resolver(config, capabilities, resolver))
    }

    pub fn with_resolver(config: Config, capabilities: Capabilities, resolver: FileResolver) -> Self {
        let selector = StrategySelector::new(capabilities, &config);
        Self {
            config,
            resolver,
            selector,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Strategies this processor may run, in order
    pub fn chain(&self) -> Vec<Strategy> {
        self.selector.chain()
    }

    /// Run detection without writing anything; failures become failure results
    pub fn detect<P: AsRef<Path>>(&mut self, input: P) -> DetectionResult {
        let started = Instant::now();

        let audio = match self.resolver.resolve(input) {
            Ok(audio) => audio,
            Err(err) => {
                log::error!("{}", err);
                return DetectionResult::failure(&err);
            }
        };

        let detection = match self.selector.select(&audio) {
            Ok(detection) => detection,
            Err(err) => {
                log::error!("{}", err);
                return DetectionResult::failure(&err);
            }
        };

        let downbeats = DownbeatSequence::from_events(&detection.events);
        let info = ProcessingInfo {
            rnn_processing_time: detection.extraction_secs,
            tracking_time: detection.tracking_secs,
            total_time: started.elapsed().as_secs_f64(),
            fps: self.config.detection.analysis_fps as f64,
            video_fps: self.config.output.video_fps,
            beats_per_bar: self.config.detection.beats_per_bar,
        };
        log::info!(
            "Found {} downbeats ({} events) with {}",
            downbeats.len(),
            detection.events.len(),
            detection.strategy
        );

        DetectionResult::success(audio, detection.strategy, downbeats, info)
    }

    /// Detect and write the record to `output`.
    ///
    /// Returns `Err` only when the record itself could not be written;
    /// detection failures are reported inside the returned result.
    pub fn process<P: AsRef<Path>, Q: AsRef<Path>>(
        &mut self,
        input: P,
        output: Q,
    ) -> DownbeatResult<DetectionResult> {
        let result = self.detect(input);
        export::write_result(
            output,
            &result,
            self.config.output.profile,
            self.config.output.write_retries,
        )?;
        Ok(result)
    }
}
