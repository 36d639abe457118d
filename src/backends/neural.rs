//! ONNX downbeat model (mel frontend + beat/downbeat network)
//!
//! Two sessions: `audio_pcm (1, N) -> mel_spectrogram (1, T, n_mels)` and
//! `mel_spectrogram (1, chunk, n_mels) -> beat_logits, downbeat_logits`.
//! Long inputs are processed in overlapping chunks whose borders are
//! discarded. Earlier chunks take precedence where they overlap.

use super::peaks::PeakTracker;
use super::{ActivationMatrix, DownbeatModel};
use crate::analysis::DetectionEvent;
use crate::audio::{load_audio_file, resample_linear};
use crate::config::NeuralConfig;
use crate::error::Result;
use crate::resolver::AudioReference;
use anyhow::{bail, Context};
use ndarray::{s, Array2, Array3, ArrayView2, Axis, Ix3};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Value,
};
use std::path::Path;

/// Logit written to frames no chunk covered
const UNCOVERED_LOGIT: f32 = -1000.0;

pub struct NeuralDownbeatModel {
    mel_session: Session,
    beat_session: Session,
    config: NeuralConfig,
    tracker: PeakTracker,
}

impl NeuralDownbeatModel {
    /// Load both model files; fails if either is missing or rejected by ort
    pub fn load(config: &NeuralConfig) -> anyhow::Result<Self> {
        let mel_session = open_session(Path::new(&config.mel_model)).context("mel frontend")?;
        let beat_session = open_session(Path::new(&config.beat_model)).context("beat network")?;
        log::info!(
            "Loaded neural models {} and {}",
            config.mel_model,
            config.beat_model
        );

        Ok(Self {
            mel_session,
            beat_session,
            tracker: PeakTracker::new(config.peak_threshold, config.peak_window),
            config: config.clone(),
        })
    }

    fn mel_spectrogram(&mut self, samples: &[f32]) -> anyhow::Result<Array2<f32>> {
        let input = Array2::from_shape_vec((1, samples.len()), samples.to_vec())?;
        let outputs = self
            .mel_session
            .run(ort::inputs!["audio_pcm" => Value::from_array(input)?])?;

        let (shape, data) = outputs["mel_spectrogram"].try_extract_tensor::<f32>()?;
        let shape: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        let mel = ndarray::Array::from_shape_vec(shape, data.to_vec())?.into_dimensionality::<Ix3>()?;

        Ok(mel.index_axis(Axis(0), 0).to_owned())
    }

    fn beat_logits(&mut self, mel: ArrayView2<f32>) -> anyhow::Result<Array2<f32>> {
        let chunk = self.config.chunk_size;
        let border = self.config.border_size;
        if chunk <= 2 * border {
            bail!("chunk_size {} leaves no frames inside borders of {}", chunk, border);
        }

        let n_frames = mel.nrows();
        let n_mels = mel.ncols();
        let mut logits = Array2::<f32>::from_elem((n_frames, 2), UNCOVERED_LOGIT);

        // Later chunks run first so earlier ones overwrite the overlap
        for start in chunk_starts(n_frames, chunk, border).into_iter().rev() {
            let src_start = start.max(0) as usize;
            let src_end = (start + chunk as isize).min(n_frames as isize) as usize;
            let pad_left = (-start).max(0) as usize;
            let len = src_end - src_start;

            let mut input = Array3::<f32>::zeros((1, chunk, n_mels));
            input
                .slice_mut(s![0, pad_left..pad_left + len, ..])
                .assign(&mel.slice(s![src_start..src_end, ..]));

            let outputs = self
                .beat_session
                .run(ort::inputs!["mel_spectrogram" => Value::from_array(input)?])?;
            let (_, beat) = outputs["beat_logits"].try_extract_tensor::<f32>()?;
            let (_, down) = outputs["downbeat_logits"].try_extract_tensor::<f32>()?;
            if beat.len() < chunk || down.len() < chunk {
                bail!("beat network returned {} frames for a chunk of {}", beat.len(), chunk);
            }

            let write_start = (start + border as isize) as usize;
            for i in 0..chunk - 2 * border {
                let frame = write_start + i;
                if frame >= n_frames {
                    break;
                }
                logits[[frame, 0]] = beat[border + i];
                logits[[frame, 1]] = down[border + i];
            }
        }

        Ok(logits)
    }
}

impl DownbeatModel for NeuralDownbeatModel {
    fn name(&self) -> &str {
        "onnx"
    }

    fn extract_activations(&mut self, audio: &AudioReference) -> Result<ActivationMatrix> {
        let decoded = load_audio_file(audio.location())?;
        let samples = resample_linear(&decoded.samples, decoded.sample_rate, self.config.sample_rate);
        log::debug!(
            "Running mel frontend on {} samples at {} Hz",
            samples.len(),
            self.config.sample_rate
        );

        let mel = self.mel_spectrogram(&samples)?;
        let logits = self.beat_logits(mel.view())?;
        Ok(ActivationMatrix::new(logits))
    }

    fn track_events(
        &mut self,
        activations: &ActivationMatrix,
        beats_per_bar: u32,
        fps: f32,
    ) -> Result<Vec<DetectionEvent>> {
        Ok(self.tracker.track(activations, beats_per_bar, fps))
    }
}

fn open_session(path: &Path) -> anyhow::Result<Session> {
    if !path.exists() {
        bail!("model file {} does not exist", path.display());
    }
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(1)?
        .commit_from_file(path)?;
    Ok(session)
}

/// Chunk start frames (possibly negative) covering `n_frames`; the last
/// chunk is pulled back so it ends flush with the input
fn chunk_starts(n_frames: usize, chunk: usize, border: usize) -> Vec<isize> {
    let step = (chunk - 2 * border) as isize;
    let end = n_frames as isize - border as isize;

    let mut starts = Vec::new();
    let mut current = -(border as isize);
    while current < end {
        starts.push(current);
        current += step;
    }

    if n_frames as isize > step {
        if let Some(last) = starts.last_mut() {
            *last = n_frames as isize - (chunk as isize - border as isize);
        }
    }
    starts
}
