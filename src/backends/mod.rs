//! Signal-processing backends
//!
//! Strategies talk to analysis libraries only through the traits below.
//! The activation matrix is opaque above this layer: it is produced by
//! [`DownbeatModel::extract_activations`] and only read back by
//! [`DownbeatModel::track_events`].

use crate::analysis::DetectionEvent;
use crate::error::Result;
use crate::resolver::AudioReference;
use ndarray::Array2;

#[cfg(feature = "neural")]
pub mod neural;
pub mod peaks;
#[cfg(feature = "spectral")]
pub mod tempo;

/// Frame-wise beat/downbeat activations (frames x 2)
#[derive(Debug, Clone)]
pub struct ActivationMatrix {
    data: Array2<f32>,
}

impl ActivationMatrix {
    /// Column 0 holds beat activations, column 1 downbeat activations
    pub fn new(data: Array2<f32>) -> Self {
        Self { data }
    }

    pub fn n_frames(&self) -> usize {
        self.data.nrows()
    }

    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }
}

/// Two-stage downbeat analysis: activation extraction, then tracking
pub trait DownbeatModel {
    /// Human-readable backend name for logs
    fn name(&self) -> &str;

    /// Run the activation network over an audio file
    fn extract_activations(&mut self, audio: &AudioReference) -> Result<ActivationMatrix>;

    /// Turn activations into labelled beat events
    fn track_events(
        &mut self,
        activations: &ActivationMatrix,
        beats_per_bar: u32,
        fps: f32,
    ) -> Result<Vec<DetectionEvent>>;
}

/// Beats and tempo from a lower-fidelity tracker
#[derive(Debug, Clone, PartialEq)]
pub struct BeatTrack {
    pub tempo_bpm: f32,
    /// Beat times in seconds, increasing
    pub beats: Vec<f64>,
}

/// Tempo-based beat tracking without downbeat labels
pub trait BeatTracker {
    fn name(&self) -> &str;

    fn beat_track(&mut self, audio: &AudioReference) -> Result<BeatTrack>;
}
