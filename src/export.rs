//! Result records and their persistence
//!
//! One [`DetectionResult`] model, two serialisation profiles. A failure
//! always serialises to the same shape whichever profile is selected.

use crate::analysis::{DownbeatSequence, FrameSequence};
use crate::error::{DownbeatError, Result};
use crate::resolver::AudioReference;
use crate::strategy::Strategy;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Shape of the written JSON record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputProfile {
    /// `{success, downbeats, count, audio_file, method}`
    #[default]
    Simple,
    /// Frame indices, times and timing metadata for video sync
    Frames,
}

impl std::str::FromStr for OutputProfile {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "simple" => Ok(OutputProfile::Simple),
            "frames" => Ok(OutputProfile::Frames),
            other => Err(format!("unknown profile '{}' (expected simple or frames)", other)),
        }
    }
}

/// Timing metadata carried by the frames profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingInfo {
    pub rnn_processing_time: f64,
    pub tracking_time: f64,
    pub total_time: f64,
    /// Analysis frame rate of the activation signal
    pub fps: f64,
    pub video_fps: f64,
    pub beats_per_bar: u32,
}

/// Terminal record of one run
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub success: bool,
    pub downbeats: DownbeatSequence,
    pub frames: FrameSequence,
    pub audio_file: Option<AudioReference>,
    pub method: Option<Strategy>,
    pub error: Option<String>,
    pub processing_info: ProcessingInfo,
}

impl DetectionResult {
    pub fn success(
        audio_file: AudioReference,
        method: Strategy,
        downbeats: DownbeatSequence,
        processing_info: ProcessingInfo,
    ) -> Self {
        let frames = downbeats.to_frames(processing_info.video_fps);
        Self {
            success: true,
            downbeats,
            frames,
            audio_file: Some(audio_file),
            method: Some(method),
            error: None,
            processing_info,
        }
    }

    pub fn failure(error: &DownbeatError) -> Self {
        Self {
            success: false,
            downbeats: DownbeatSequence::default(),
            frames: FrameSequence::default(),
            audio_file: None,
            method: None,
            error: Some(error.record_message()),
            processing_info: ProcessingInfo::default(),
        }
    }

    /// Number of downbeats (0 on failure)
    pub fn count(&self) -> usize {
        if self.success {
            self.downbeats.len()
        } else {
            0
        }
    }

    /// One-line human summary
    pub fn summary(&self) -> String {
        match (&self.audio_file, self.method, &self.error) {
            (Some(audio), Some(method), _) if self.success => format!(
                "Found {} downbeats in {} using {}",
                self.count(),
                audio.requested().display(),
                method
            ),
            (_, _, Some(error)) => format!("Detection failed: {}", error),
            _ => "Detection failed".to_string(),
        }
    }
}

#[derive(Serialize)]
struct SimpleRecord<'a> {
    success: bool,
    downbeats: &'a [f64],
    count: usize,
    audio_file: &'a Path,
    method: Strategy,
}

#[derive(Serialize)]
struct FramesRecord<'a> {
    success: bool,
    audio_file: &'a Path,
    method: Strategy,
    count: usize,
    downbeat_frames: &'a [i64],
    downbeat_times: &'a [f64],
    processing_info: &'a ProcessingInfo,
}

#[derive(Serialize)]
struct FailureRecord<'a> {
    success: bool,
    error: &'a str,
    downbeats: &'a [f64],
    count: usize,
}

/// Pretty-printed JSON for a result under the given profile
pub fn render(result: &DetectionResult, profile: OutputProfile) -> Result<String> {
    let json = match (&result.audio_file, result.method) {
        (Some(audio), Some(method)) if result.success => match profile {
            OutputProfile::Simple => serde_json::to_string_pretty(&SimpleRecord {
                success: true,
                downbeats: result.downbeats.times(),
                count: result.count(),
                audio_file: audio.requested(),
                method,
            })?,
            OutputProfile::Frames => serde_json::to_string_pretty(&FramesRecord {
                success: true,
                audio_file: audio.location(),
                method,
                count: result.count(),
                downbeat_frames: result.frames.frames(),
                downbeat_times: result.downbeats.times(),
                processing_info: &result.processing_info,
            })?,
        },
        _ => serde_json::to_string_pretty(&FailureRecord {
            success: false,
            error: result.error.as_deref().unwrap_or("unknown error"),
            downbeats: &[],
            count: 0,
        })?,
    };
    Ok(json)
}

/// Write the record atomically, retrying up to `attempts` times
pub fn write_result<P: AsRef<Path>>(
    path: P,
    result: &DetectionResult,
    profile: OutputProfile,
    attempts: u32,
) -> Result<()> {
    let path = path.as_ref();
    let json = render(result, profile)?;
    let attempts = attempts.max(1);

    let mut last_error = String::new();
    for attempt in 1..=attempts {
        match write_atomic(path, json.as_bytes()) {
            Ok(()) => {
                log::info!("Results saved to {}", path.display());
                return Ok(());
            }
            Err(err) => {
                log::warn!(
                    "Write attempt {}/{} for {} failed: {}",
                    attempt,
                    attempts,
                    path.display(),
                    err
                );
                last_error = err.to_string();
            }
        }
    }

    Err(DownbeatError::Serialization(format!(
        "could not write {} after {} attempts: {}",
        path.display(),
        attempts,
        last_error
    )))
}

/// Temp file in the destination directory, then rename over the target
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.write_all(b"\n")?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
