//! Configuration system for the downbeat detector

use crate::export::OutputProfile;
use crate::strategy::{ErrorPolicy, Strategy};
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: String,
    pub resolver: ResolverConfig,
    pub detection: DetectionConfig,
    pub neural: NeuralConfig,
    pub tempo: TempoConfig,
    pub fallback: FallbackConfig,
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            resolver: ResolverConfig::default(),
            detection: DetectionConfig::default(),
            neural: NeuralConfig::default(),
            tempo: TempoConfig::default(),
            fallback: FallbackConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// Conventional filenames tried when the nominal input is missing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub fallback_names: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fallback_names: vec!["song.mp3".to_string(), "song_converted.mp3".to_string()],
        }
    }
}

/// Strategy selection and tracker parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub beats_per_bar: u32,
    /// Frame rate of the activation signal (not the video frame rate)
    pub analysis_fps: f32,
    /// Run only this strategy instead of the first available one
    pub strategy: Option<Strategy>,
    pub on_processing_error: ErrorPolicy,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            beats_per_bar: 4,
            analysis_fps: 100.0,
            strategy: None,
            on_processing_error: ErrorPolicy::Fail,
        }
    }
}

/// ONNX activation model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NeuralConfig {
    pub enabled: bool,
    pub mel_model: String,
    pub beat_model: String,
    pub sample_rate: u32,
    pub chunk_size: usize,
    pub border_size: usize,
    /// Logit threshold for peak picking (0.0 = probability 0.5)
    pub peak_threshold: f32,
    /// Max-pool window in frames, odd
    pub peak_window: usize,
}

impl Default for NeuralConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mel_model: "models/mel.onnx".to_string(),
            beat_model: "models/beat.onnx".to_string(),
            sample_rate: 22050,
            chunk_size: 1500,
            border_size: 6,
            peak_threshold: 0.0,
            peak_window: 7,
        }
    }
}

/// Tempo-based beat tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    pub enabled: bool,
    pub n_fft: usize,
    pub hop_length: usize,
    pub min_bpm: f32,
    pub max_bpm: f32,
    /// Centre of the tempo prior
    pub start_bpm: f32,
    /// How strictly beats follow the estimated period
    pub tightness: f32,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            n_fft: 2048,
            hop_length: 512,
            min_bpm: 60.0,
            max_bpm: 240.0,
            start_bpm: 120.0,
            tightness: 100.0,
        }
    }
}

/// Synthetic grid used when nothing else is available
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub bpm: f64,
    pub default_duration_sec: f64,
    /// Header durations above this are not trusted
    pub max_duration_sec: f64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            default_duration_sec: 240.0,
            max_duration_sec: 24.0 * 3600.0,
        }
    }
}

/// Result record configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub profile: OutputProfile,
    pub video_fps: f64,
    pub write_retries: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            profile: OutputProfile::Simple,
            video_fps: 60.0,
            write_retries: 3,
        }
    }
}

/// Validate configuration parameters
pub fn validate_config(config: &Config) -> anyhow::Result<()> {
    if config.detection.beats_per_bar == 0 {
        anyhow::bail!("detection.beats_per_bar must be >= 1");
    }
    if !is_positive(config.detection.analysis_fps as f64) {
        anyhow::bail!("detection.analysis_fps must be finite and > 0");
    }
    if !is_positive(config.output.video_fps) {
        anyhow::bail!("output.video_fps must be finite and > 0");
    }
    if config.output.write_retries == 0 {
        anyhow::bail!("output.write_retries must be >= 1");
    }
    let fallback = &config.fallback;
    if !is_positive(fallback.bpm) || !is_positive(fallback.default_duration_sec) {
        anyhow::bail!("fallback.bpm and fallback.default_duration_sec must be finite and > 0");
    }
    if !is_positive(fallback.max_duration_sec) {
        anyhow::bail!("fallback.max_duration_sec must be finite and > 0");
    }

    let tempo = &config.tempo;
    let bpms = [tempo.min_bpm, tempo.max_bpm, tempo.start_bpm];
    if bpms.iter().any(|&bpm| !is_positive(bpm as f64)) || tempo.min_bpm >= tempo.max_bpm {
        anyhow::bail!("tempo bpm values must be finite and > 0, with min_bpm < max_bpm");
    }
    if !tempo.tightness.is_finite() {
        anyhow::bail!("tempo.tightness must be finite");
    }
    if tempo.hop_length == 0 || tempo.n_fft < tempo.hop_length {
        anyhow::bail!("tempo.n_fft must be >= tempo.hop_length > 0");
    }

    let neural = &config.neural;
    if neural.chunk_size <= 2 * neural.border_size {
        anyhow::bail!("neural.chunk_size must exceed twice neural.border_size");
    }
    if neural.peak_window % 2 == 0 {
        anyhow::bail!("neural.peak_window must be odd");
    }
    if neural.sample_rate == 0 {
        anyhow::bail!("neural.sample_rate must be > 0");
    }

    Ok(())
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Load configuration from JSON file
pub fn load_config<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Save configuration to JSON file
pub fn save_config<P: AsRef<std::path::Path>>(config: &Config, path: P) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.detection.beats_per_bar, 4);
        assert_eq!(config.detection.analysis_fps, 100.0);
        assert_eq!(config.output.video_fps, 60.0);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{ "output": { "profile": "frames" }, "detection": { "strategy": "librosa" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.output.profile, OutputProfile::Frames);
        assert_eq!(config.output.video_fps, 60.0);
        assert_eq!(config.detection.strategy, Some(Strategy::Secondary));
        assert_eq!(config.resolver.fallback_names.len(), 2);
    }

    #[test]
    fn test_rejects_bad_tempo_range() {
        let mut config = Config::default();
        config.tempo.min_bpm = 200.0;
        config.tempo.max_bpm = 100.0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_non_finite_video_fps() {
        for fps in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut config = Config::default();
            config.output.video_fps = fps;
            assert!(validate_config(&config).is_err(), "accepted video_fps {}", fps);
        }
    }

    #[test]
    fn test_rejects_non_finite_rates() {
        let mut config = Config::default();
        config.detection.analysis_fps = f32::NAN;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.fallback.bpm = f64::INFINITY;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.fallback.default_duration_sec = f64::NAN;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.tempo.max_bpm = f32::INFINITY;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.tempo.start_bpm = f32::NAN;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_zero_beats_per_bar() {
        let mut config = Config::default();
        config.detection.beats_per_bar = 0;
        assert!(validate_config(&config).is_err());
    }
}
