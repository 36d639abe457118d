//! Detection events and their normalised downbeat/frame form

use serde::{Deserialize, Serialize};

/// One tracked beat: time and 1-based position in the bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    /// Time in seconds
    pub time_sec: f64,
    /// Position in the bar, 1 = downbeat
    pub position: u32,
}

impl DetectionEvent {
    pub fn new(time_sec: f64, position: u32) -> Self {
        Self { time_sec, position }
    }

    /// Event at the first beat of a bar
    pub fn downbeat(time_sec: f64) -> Self {
        Self::new(time_sec, 1)
    }

    pub fn is_downbeat(&self) -> bool {
        self.position == 1
    }
}

/// Strictly increasing downbeat times in seconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownbeatSequence(Vec<f64>);

impl DownbeatSequence {
    /// Keep the downbeats of an event stream, in order.
    ///
    /// A downbeat that does not come strictly after the previous one is
    /// dropped, so the sequence stays strictly increasing even when a
    /// detector repeats a timestamp.
    pub fn from_events(events: &[DetectionEvent]) -> Self {
        let mut times: Vec<f64> = Vec::new();

        for event in events.iter().filter(|e| e.is_downbeat()) {
            match times.last() {
                Some(&last) if event.time_sec <= last => {
                    log::warn!(
                        "Dropping downbeat at {:.4}s (not after previous {:.4}s)",
                        event.time_sec,
                        last
                    );
                }
                _ => times.push(event.time_sec),
            }
        }

        DownbeatSequence(times)
    }

    pub fn times(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Frame indices at the given output frame rate
    pub fn to_frames(&self, video_fps: f64) -> FrameSequence {
        FrameSequence(self.0.iter().map(|&t| time_to_frame(t, video_fps)).collect())
    }
}

/// Frame index per downbeat, same order as the source sequence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameSequence(Vec<i64>);

impl FrameSequence {
    pub fn frames(&self) -> &[i64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Convert a timestamp to a frame index, rounding half away from zero
pub fn time_to_frame(time_sec: f64, fps: f64) -> i64 {
    (time_sec * fps).round() as i64
}
