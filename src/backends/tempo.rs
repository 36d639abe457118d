//! Tempo-based beat tracker
//!
//! Onset envelope from log-magnitude spectral flux, a global tempo from its
//! autocorrelation under a log-normal tempo prior, then dynamic-programming
//! beat placement (Ellis 2007). No downbeat labels are produced.

use super::{BeatTrack, BeatTracker};
use crate::audio::load_audio_file;
use crate::config::TempoConfig;
use crate::error::{DownbeatError, Result};
use crate::resolver::AudioReference;
use crate::spectral::{magnitude_spectrogram, onset_envelope, stft};

/// Beat tracker over decoded audio
pub struct TempoBeatTracker {
    config: TempoConfig,
}

impl TempoBeatTracker {
    pub fn new(config: TempoConfig) -> Self {
        Self { config }
    }

    /// Track beats in mono samples
    pub fn track_samples(&self, samples: &[f32], sample_rate: u32) -> Result<BeatTrack> {
        let n_fft = self.config.n_fft;
        let hop = self.config.hop_length;

        if samples.len() < n_fft {
            return Err(DownbeatError::Processing(format!(
                "audio too short for beat tracking ({} samples, need {})",
                samples.len(),
                n_fft
            )));
        }

        // Centre frames on their timestamps
        let pad = n_fft / 2;
        let mut padded = vec![0.0f32; samples.len() + 2 * pad];
        padded[pad..pad + samples.len()].copy_from_slice(samples);

        let stft_data = stft(&padded, n_fft, hop, sample_rate);
        let envelope = onset_envelope(&magnitude_spectrogram(&stft_data));
        let frame_rate = sample_rate as f32 / hop as f32;

        let envelope = match normalize_envelope(&envelope) {
            Some(env) => env,
            None => {
                log::warn!("Onset envelope is flat; no beats found");
                return Ok(BeatTrack {
                    tempo_bpm: 0.0,
                    beats: Vec::new(),
                });
            }
        };

        let tempo_bpm = estimate_tempo(&envelope, frame_rate, &self.config);
        let period = ((60.0 * frame_rate / tempo_bpm).round() as usize).max(1);
        log::debug!(
            "Tempo estimate {:.1} BPM ({} frames per beat at {:.2} frames/s)",
            tempo_bpm,
            period,
            frame_rate
        );

        let beat_frames = track_beats(&envelope, period, self.config.tightness);
        let beats = beat_frames
            .iter()
            .map(|&frame| frame as f64 * hop as f64 / sample_rate as f64)
            .collect();

        Ok(BeatTrack { tempo_bpm, beats })
    }
}

impl BeatTracker for TempoBeatTracker {
    fn name(&self) -> &str {
        "tempo-dp"
    }

    fn beat_track(&mut self, audio: &AudioReference) -> Result<BeatTrack> {
        let decoded = load_audio_file(audio.location())?;
        log::debug!(
            "Decoded {:.1}s at {} Hz",
            decoded.duration_sec(),
            decoded.sample_rate
        );
        self.track_samples(&decoded.samples, decoded.sample_rate)
    }
}

/// Divide by the sample standard deviation; `None` when the envelope is flat
fn normalize_envelope(envelope: &[f32]) -> Option<Vec<f32>> {
    if envelope.len() < 2 {
        return None;
    }
    let n = envelope.len() as f32;
    let mean = envelope.iter().sum::<f32>() / n;
    let var = envelope.iter().map(|&x| (x - mean).powi(2)).sum::<f32>() / (n - 1.0);
    let std = var.sqrt();
    if std < 1e-9 {
        return None;
    }
    Some(envelope.iter().map(|&x| x / std).collect())
}

/// Autocorrelation tempo estimate, weighted by a prior one octave wide
/// around `start_bpm`
fn estimate_tempo(envelope: &[f32], frame_rate: f32, config: &TempoConfig) -> f32 {
    let min_lag = ((60.0 * frame_rate / config.max_bpm).ceil() as usize).max(1);
    let max_lag =
        ((60.0 * frame_rate / config.min_bpm).floor() as usize).min(envelope.len().saturating_sub(1));

    let mut best: Option<(usize, f32)> = None;
    for lag in min_lag..=max_lag {
        let acf: f32 = envelope[..envelope.len() - lag]
            .iter()
            .zip(&envelope[lag..])
            .map(|(a, b)| a * b)
            .sum();
        let bpm = 60.0 * frame_rate / lag as f32;
        let octaves = (bpm / config.start_bpm).log2();
        let score = acf * (-0.5 * octaves * octaves).exp();

        if score > best.map_or(0.0, |(_, s)| s) {
            best = Some((lag, score));
        }
    }

    match best {
        Some((lag, _)) => 60.0 * frame_rate / lag as f32,
        None => config.start_bpm,
    }
}

/// Envelope smoothed with a narrow Gaussian scaled to the beat period
fn local_score(envelope: &[f32], period: usize) -> Vec<f32> {
    let p = period as isize;
    let window: Vec<f32> = (-p..=p)
        .map(|k| (-0.5 * (k as f32 * 32.0 / period as f32).powi(2)).exp())
        .collect();

    let n = envelope.len() as isize;
    (0..n)
        .map(|i| {
            (-p..=p)
                .filter(|k| (0..n).contains(&(i + k)))
                .map(|k| envelope[(i + k) as usize] * window[(k + p) as usize])
                .sum::<f32>()
        })
        .collect()
}

/// Dynamic-programming beat placement; returns frame indices in order
fn track_beats(envelope: &[f32], period: usize, tightness: f32) -> Vec<usize> {
    let n = envelope.len();
    if n == 0 {
        return Vec::new();
    }

    let localscore = local_score(envelope, period);
    let mut cumscore = vec![0.0f32; n];
    let mut backlink: Vec<Option<usize>> = vec![None; n];

    let min_back = (period / 2).max(1);
    let max_back = 2 * period;

    for i in 0..n {
        let mut best: Option<(usize, f32)> = None;
        for back in min_back..=max_back.min(i) {
            let j = i - back;
            let deviation = (back as f32 / period as f32).ln();
            let score = cumscore[j] - tightness * deviation * deviation;
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((j, score));
            }
        }

        match best {
            Some((j, score)) if score > 0.0 => {
                cumscore[i] = localscore[i] + score;
                backlink[i] = Some(j);
            }
            _ => cumscore[i] = localscore[i],
        }
    }

    let tail = last_strong_peak(&cumscore);
    let mut beats = vec![tail];
    let mut current = tail;
    while let Some(prev) = backlink[current] {
        beats.push(prev);
        current = prev;
    }
    beats.reverse();

    trim_weak_edges(beats, &localscore)
}

/// Last local maximum of the cumulative score above half the median peak
fn last_strong_peak(cumscore: &[f32]) -> usize {
    let n = cumscore.len();
    let peaks: Vec<usize> = (0..n)
        .filter(|&i| {
            let left = i == 0 || cumscore[i] > cumscore[i - 1];
            let right = i + 1 == n || cumscore[i] >= cumscore[i + 1];
            left && right
        })
        .collect();

    if peaks.is_empty() {
        return n - 1;
    }

    let mut values: Vec<f32> = peaks.iter().map(|&i| cumscore[i]).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let threshold = 0.5 * values[values.len() / 2];

    peaks
        .iter()
        .rev()
        .copied()
        .find(|&i| cumscore[i] >= threshold)
        .unwrap_or(peaks[peaks.len() - 1])
}

/// Drop leading and trailing beats that sit on little onset energy
fn trim_weak_edges(beats: Vec<usize>, localscore: &[f32]) -> Vec<usize> {
    if beats.is_empty() {
        return beats;
    }
    let rms = (beats.iter().map(|&b| localscore[b].powi(2)).sum::<f32>() / beats.len() as f32).sqrt();
    let threshold = 0.5 * rms;

    let start = beats.iter().position(|&b| localscore[b] > threshold);
    let end = beats.iter().rposition(|&b| localscore[b] > threshold);
    match (start, end) {
        (Some(s), Some(e)) => beats[s..=e].to_vec(),
        _ => Vec::new(),
    }
}
