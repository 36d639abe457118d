//! Detection strategy selection
//!
//! Three strategies share one [`DownbeatDetector`] interface. Which of them
//! can run is decided once by [`Capabilities::probe`]; the
//! [`StrategySelector`] then runs exactly one per request, in priority
//! order, unless the error policy allows degrading to the next.

use crate::analysis::DetectionEvent;
use crate::audio::wav_duration_sec;
use crate::backends::{BeatTracker, DownbeatModel};
use crate::config::{Config, FallbackConfig};
use crate::error::{DownbeatError, Result};
use crate::resolver::AudioReference;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// Detection strategy, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Neural activations + bar-aware tracking
    #[serde(rename = "primary")]
    Primary,
    /// Tempo-based beat tracking, every bar's first beat taken as downbeat
    #[serde(rename = "librosa")]
    Secondary,
    /// Synthetic grid at a fixed tempo
    #[serde(rename = "fallback")]
    Fallback,
}

impl Strategy {
    pub const PRIORITY: [Strategy; 3] = [Strategy::Primary, Strategy::Secondary, Strategy::Fallback];

    /// Method tag written to result records
    pub fn tag(&self) -> &'static str {
        match self {
            Strategy::Primary => "primary",
            Strategy::Secondary => "librosa",
            Strategy::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "primary" => Ok(Strategy::Primary),
            "librosa" | "secondary" => Ok(Strategy::Secondary),
            "fallback" => Ok(Strategy::Fallback),
            other => Err(format!(
                "unknown strategy '{}' (expected primary, librosa or fallback)",
                other
            )),
        }
    }
}

/// What to do when the running strategy fails on a file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Report the failure
    #[default]
    Fail,
    /// Try the next available strategy
    Degrade,
}

impl FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail" => Ok(ErrorPolicy::Fail),
            "degrade" => Ok(ErrorPolicy::Degrade),
            other => Err(format!("unknown error policy '{}' (expected fail or degrade)", other)),
        }
    }
}

/// Raw output of one strategy run
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub strategy: Strategy,
    pub events: Vec<DetectionEvent>,
    /// Seconds spent extracting activations (primary only)
    pub extraction_secs: f64,
    /// Seconds spent tracking
    pub tracking_secs: f64,
}

/// One strategy, dispatched polymorphically by the selector
pub trait DownbeatDetector {
    fn strategy(&self) -> Strategy;

    fn detect(&mut self, audio: &AudioReference) -> Result<Detection>;
}

/// Activation model followed by its tracker
pub struct PrimaryDetector {
    model: Box<dyn DownbeatModel>,
    beats_per_bar: u32,
    analysis_fps: f32,
}

impl PrimaryDetector {
    pub fn new(model: Box<dyn DownbeatModel>, beats_per_bar: u32, analysis_fps: f32) -> Self {
        Self {
            model,
            beats_per_bar,
            analysis_fps,
        }
    }
}

impl DownbeatDetector for PrimaryDetector {
    fn strategy(&self) -> Strategy {
        Strategy::Primary
    }

    fn detect(&mut self, audio: &AudioReference) -> Result<Detection> {
        log::info!("Extracting activations with {}", self.model.name());
        let start = Instant::now();
        let activations = self.model.extract_activations(audio)?;
        let extraction_secs = start.elapsed().as_secs_f64();
        log::debug!(
            "{} activation frames in {:.2}s",
            activations.n_frames(),
            extraction_secs
        );

        let start = Instant::now();
        let events = self
            .model
            .track_events(&activations, self.beats_per_bar, self.analysis_fps)?;
        let tracking_secs = start.elapsed().as_secs_f64();

        Ok(Detection {
            strategy: Strategy::Primary,
            events,
            extraction_secs,
            tracking_secs,
        })
    }
}

/// Beat tracker with synthesised bar positions
pub struct SecondaryDetector {
    tracker: Box<dyn BeatTracker>,
    beats_per_bar: u32,
}

impl SecondaryDetector {
    pub fn new(tracker: Box<dyn BeatTracker>, beats_per_bar: u32) -> Self {
        Self {
            tracker,
            beats_per_bar,
        }
    }
}

impl DownbeatDetector for SecondaryDetector {
    fn strategy(&self) -> Strategy {
        Strategy::Secondary
    }

    fn detect(&mut self, audio: &AudioReference) -> Result<Detection> {
        log::info!("Tracking beats with {}", self.tracker.name());
        let start = Instant::now();
        let track = self.tracker.beat_track(audio)?;
        log::info!(
            "Estimated tempo {:.1} BPM, {} beats",
            track.tempo_bpm,
            track.beats.len()
        );

        Ok(Detection {
            strategy: Strategy::Secondary,
            events: events_from_beats(&track.beats, self.beats_per_bar),
            extraction_secs: 0.0,
            tracking_secs: start.elapsed().as_secs_f64(),
        })
    }
}

/// Bar positions for an unlabelled beat list: beat `i` gets
/// `i % beats_per_bar + 1`, so the first beat opens a bar
pub fn events_from_beats(beats: &[f64], beats_per_bar: u32) -> Vec<DetectionEvent> {
    let beats_per_bar = beats_per_bar.max(1) as usize;
    beats
        .iter()
        .enumerate()
        .map(|(i, &t)| DetectionEvent::new(t, (i % beats_per_bar) as u32 + 1))
        .collect()
}

/// Fixed-tempo downbeat grid over the clip duration
#[derive(Debug, Clone)]
pub struct FallbackDetector {
    bpm: f64,
    default_duration_sec: f64,
    max_duration_sec: f64,
    beats_per_bar: u32,
}

impl FallbackDetector {
    pub fn new(config: &FallbackConfig, beats_per_bar: u32) -> Self {
        Self {
            bpm: config.bpm,
            default_duration_sec: config.default_duration_sec,
            max_duration_sec: config.max_duration_sec,
            beats_per_bar: beats_per_bar.max(1),
        }
    }

    /// Seconds between downbeats
    pub fn downbeat_interval(&self) -> f64 {
        60.0 / self.bpm * self.beats_per_bar as f64
    }

    /// WAV header duration when it is plausible, the configured default otherwise
    pub fn clip_duration(&self, audio: &AudioReference) -> f64 {
        match wav_duration_sec(audio.location()) {
            Some(duration) if duration.is_finite() && duration <= self.max_duration_sec => {
                log::info!("Clip duration {:.2}s from WAV header", duration);
                duration
            }
            Some(duration) => {
                log::warn!(
                    "Header duration {:.0}s exceeds {:.0}s; assuming {:.0}s",
                    duration,
                    self.max_duration_sec,
                    self.default_duration_sec
                );
                self.default_duration_sec
            }
            None => {
                log::warn!(
                    "Duration unknown for {}; assuming {:.0}s",
                    audio.location().display(),
                    self.default_duration_sec
                );
                self.default_duration_sec
            }
        }
    }

    /// Downbeats at `0, d, 2d, ...` strictly before `duration_sec`
    pub fn grid(&self, duration_sec: f64) -> Vec<DetectionEvent> {
        let interval = self.downbeat_interval();
        if interval.is_nan() || interval <= 0.0 {
            return Vec::new();
        }
        (0u64..)
            .map(|k| k as f64 * interval)
            .take_while(|&t| t < duration_sec)
            .map(DetectionEvent::downbeat)
            .collect()
    }
}

impl DownbeatDetector for FallbackDetector {
    fn strategy(&self) -> Strategy {
        Strategy::Fallback
    }

    fn detect(&mut self, audio: &AudioReference) -> Result<Detection> {
        let start = Instant::now();
        let duration = self.clip_duration(audio);
        log::info!("Generating synthetic downbeats at {:.0} BPM", self.bpm);
        Ok(Detection {
            strategy: Strategy::Fallback,
            events: self.grid(duration),
            extraction_secs: 0.0,
            tracking_secs: start.elapsed().as_secs_f64(),
        })
    }
}

/// Which backends this process can use, fixed at startup
pub struct Capabilities {
    primary: Option<Box<dyn DownbeatModel>>,
    secondary: Option<Box<dyn BeatTracker>>,
    unavailable: Vec<(Strategy, DownbeatError)>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::new()
    }
}

impl Capabilities {
    /// Nothing but the fallback grid
    pub fn new() -> Self {
        Self {
            primary: None,
            secondary: None,
            unavailable: Vec::new(),
        }
    }

    pub fn with_primary(mut self, model: Box<dyn DownbeatModel>) -> Self {
        self.primary = Some(model);
        self.unavailable.retain(|(s, _)| *s != Strategy::Primary);
        self
    }

    pub fn with_secondary(mut self, tracker: Box<dyn BeatTracker>) -> Self {
        self.secondary = Some(tracker);
        self.unavailable.retain(|(s, _)| *s != Strategy::Secondary);
        self
    }

    /// Initialise every compiled and enabled backend once
    pub fn probe(config: &Config) -> Self {
        let mut capabilities = Self::new();

        match probe_primary(config) {
            Ok(model) => capabilities.primary = Some(model),
            Err(err) => {
                log::warn!("{}", err);
                capabilities.unavailable.push((Strategy::Primary, err));
            }
        }

        match probe_secondary(config) {
            Ok(tracker) => capabilities.secondary = Some(tracker),
            Err(err) => {
                log::warn!("{}", err);
                capabilities.unavailable.push((Strategy::Secondary, err));
            }
        }

        capabilities
    }

    pub fn is_available(&self, strategy: Strategy) -> bool {
        match strategy {
            Strategy::Primary => self.primary.is_some(),
            Strategy::Secondary => self.secondary.is_some(),
            Strategy::Fallback => true,
        }
    }

    /// Available strategies in priority order
    pub fn available(&self) -> Vec<Strategy> {
        Strategy::PRIORITY
            .into_iter()
            .filter(|&s| self.is_available(s))
            .collect()
    }

    /// Why each missing strategy could not be initialised
    pub fn unavailable(&self) -> &[(Strategy, DownbeatError)] {
        &self.unavailable
    }
}

#[cfg(feature = "neural")]
fn probe_primary(config: &Config) -> Result<Box<dyn DownbeatModel>> {
    use crate::backends::neural::NeuralDownbeatModel;

    if !config.neural.enabled {
        return Err(unavailable("neural downbeat model", "disabled in configuration"));
    }
    NeuralDownbeatModel::load(&config.neural)
        .map(|model| Box::new(model) as Box<dyn DownbeatModel>)
        .map_err(|e| unavailable("neural downbeat model", &format!("{:#}", e)))
}

#[cfg(not(feature = "neural"))]
fn probe_primary(_config: &Config) -> Result<Box<dyn DownbeatModel>> {
    Err(unavailable(
        "neural downbeat model",
        "built without the `neural` feature",
    ))
}

#[cfg(feature = "spectral")]
fn probe_secondary(config: &Config) -> Result<Box<dyn BeatTracker>> {
    use crate::backends::tempo::TempoBeatTracker;

    if !config.tempo.enabled {
        return Err(unavailable("tempo beat tracker", "disabled in configuration"));
    }
    Ok(Box::new(TempoBeatTracker::new(config.tempo.clone())))
}

#[cfg(not(feature = "spectral"))]
fn probe_secondary(_config: &Config) -> Result<Box<dyn BeatTracker>> {
    Err(unavailable(
        "tempo beat tracker",
        "built without the `spectral` feature",
    ))
}

fn unavailable(capability: &str, reason: &str) -> DownbeatError {
    DownbeatError::CapabilityUnavailable {
        capability: capability.to_string(),
        reason: reason.to_string(),
    }
}

/// Runs one strategy per request
pub struct StrategySelector {
    detectors: Vec<Box<dyn DownbeatDetector>>,
    unavailable: Vec<(Strategy, DownbeatError)>,
    forced: Option<Strategy>,
    policy: ErrorPolicy,
}

impl StrategySelector {
    pub fn new(capabilities: Capabilities, config: &Config) -> Self {
        let beats_per_bar = config.detection.beats_per_bar;
        let Capabilities {
            primary,
            secondary,
            unavailable,
        } = capabilities;

        let mut detectors: Vec<Box<dyn DownbeatDetector>> = Vec::with_capacity(3);
        if let Some(model) = primary {
            detectors.push(Box::new(PrimaryDetector::new(
                model,
                beats_per_bar,
                config.detection.analysis_fps,
            )));
        }
        if let Some(tracker) = secondary {
            detectors.push(Box::new(SecondaryDetector::new(tracker, beats_per_bar)));
        }
        detectors.push(Box::new(FallbackDetector::new(&config.fallback, beats_per_bar)));

        Self {
            detectors,
            unavailable,
            forced: config.detection.strategy,
            policy: config.detection.on_processing_error,
        }
    }

    /// Strategies that may run, in the order they are tried
    pub fn chain(&self) -> Vec<Strategy> {
        match self.forced {
            Some(forced) => vec![forced],
            None => self.detectors.iter().map(|d| d.strategy()).collect(),
        }
    }

    /// Run the selected strategy on a resolved file
    pub fn select(&mut self, audio: &AudioReference) -> Result<Detection> {
        if let Some(forced) = self.forced {
            return self.run_forced(forced, audio);
        }

        let mut last_err = None;
        for detector in self.detectors.iter_mut() {
            let strategy = detector.strategy();
            log::info!("Using {} strategy", strategy);

            match detector.detect(audio) {
                Ok(detection) => return Ok(detection),
                Err(err) if self.policy == ErrorPolicy::Degrade => {
                    log::warn!("{} strategy failed: {}; trying next", strategy, err);
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_err.unwrap_or_else(|| unavailable("detection", "no strategy available")))
    }

    fn run_forced(&mut self, forced: Strategy, audio: &AudioReference) -> Result<Detection> {
        let Some(detector) = self.detectors.iter_mut().find(|d| d.strategy() == forced) else {
            let err = self
                .unavailable
                .iter()
                .find(|(s, _)| *s == forced)
                .map(|(_, err)| err.clone())
                .unwrap_or_else(|| unavailable(forced.tag(), "not available"));
            return Err(err);
        };

        log::info!("Using {} strategy (forced)", forced);
        detector.detect(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_from_beats_marks_every_fourth() {
        let beats: Vec<f64> = (0..9).map(|i| i as f64).collect();
        let events = events_from_beats(&beats, 4);
        let downbeats: Vec<f64> = events
            .iter()
            .filter(|e| e.is_downbeat())
            .map(|e| e.time_sec)
            .collect();
        assert_eq!(downbeats, vec![0.0, 4.0, 8.0]);
        assert_eq!(events[3].position, 4);
    }

    #[test]
    fn test_fallback_grid_spacing() {
        let detector = FallbackDetector::new(&FallbackConfig::default(), 4);
        assert_eq!(detector.downbeat_interval(), 2.0);

        let grid = detector.grid(7.0);
        let times: Vec<f64> = grid.iter().map(|e| e.time_sec).collect();
        assert_eq!(times, vec![0.0, 2.0, 4.0, 6.0]);

        // End is exclusive
        assert_eq!(detector.grid(6.0).len(), 3);
        assert_eq!(detector.grid(240.0).len(), 120);
    }

    #[test]
    fn test_strategy_tags_parse() {
        assert_eq!("librosa".parse::<Strategy>(), Ok(Strategy::Secondary));
        assert_eq!("Primary".parse::<Strategy>(), Ok(Strategy::Primary));
        assert!("magic".parse::<Strategy>().is_err());
        assert_eq!(Strategy::Fallback.to_string(), "fallback");
        assert_eq!("degrade".parse::<ErrorPolicy>(), Ok(ErrorPolicy::Degrade));
    }

    #[test]
    fn test_empty_capabilities_only_fallback() {
        let capabilities = Capabilities::new();
        assert_eq!(capabilities.available(), vec![Strategy::Fallback]);

        let selector = StrategySelector::new(capabilities, &Config::default());
        assert_eq!(selector.chain(), vec![Strategy::Fallback]);
    }

    #[test]
    fn test_probe_respects_disabled_backends() {
        let mut config = Config::default();
        config.neural.enabled = false;
        config.tempo.enabled = false;

        let capabilities = Capabilities::probe(&config);
        assert_eq!(capabilities.available(), vec![Strategy::Fallback]);
        assert_eq!(capabilities.unavailable().len(), 2);
        assert!(capabilities
            .unavailable()
            .iter()
            .all(|(_, err)| matches!(err, DownbeatError::CapabilityUnavailable { .. })));
    }
}
