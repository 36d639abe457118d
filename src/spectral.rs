//! Spectral processing utilities (STFT, onset envelope)

use ndarray::Array2;
use rustfft::{num_complex::Complex32, FftPlanner};

/// STFT data structure
#[derive(Debug, Clone)]
pub struct StftData {
    pub s: Array2<Complex32>,
    pub freqs: Vec<f32>,
    pub times: Vec<f32>,
}

impl StftData {
    pub fn n_frames(&self) -> usize {
        self.s.shape()[1]
    }
}

/// Compute STFT of audio signal with a Hann window.
///
/// Signals shorter than one window produce zero frames.
pub fn stft(y: &[f32], n_fft: usize, hop_length: usize, sample_rate: u32) -> StftData {
    let n_frames = if y.len() >= n_fft {
        (y.len() - n_fft) / hop_length + 1
    } else {
        0
    };

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n_fft);
    let mut s = Array2::<Complex32>::zeros((n_fft / 2 + 1, n_frames));
    let window_fn = hann_window(n_fft);

    for frame_idx in 0..n_frames {
        let start = frame_idx * hop_length;

        let mut frame: Vec<Complex32> = y[start..start + n_fft]
            .iter()
            .zip(&window_fn)
            .map(|(&sample, &win)| Complex32::new(sample * win, 0.0))
            .collect();

        fft.process(&mut frame);

        for (i, &val) in frame[..n_fft / 2 + 1].iter().enumerate() {
            s[[i, frame_idx]] = val;
        }
    }

    let freqs: Vec<f32> = (0..n_fft / 2 + 1)
        .map(|i| i as f32 * sample_rate as f32 / n_fft as f32)
        .collect();

    let times: Vec<f32> = (0..n_frames)
        .map(|i| i as f32 * hop_length as f32 / sample_rate as f32)
        .collect();

    StftData { s, freqs, times }
}

fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos()))
        .collect()
}

/// Compute magnitude spectrogram
pub fn magnitude_spectrogram(stft_data: &StftData) -> Array2<f32> {
    stft_data.s.map(|c| c.norm())
}

/// Onset strength envelope: half-wave rectified log-magnitude flux,
/// averaged over frequency, one value per STFT frame.
pub fn onset_envelope(mag_spec: &Array2<f32>) -> Vec<f32> {
    let (n_bins, n_frames) = (mag_spec.shape()[0], mag_spec.shape()[1]);
    let mut envelope = vec![0.0; n_frames];
    if n_bins == 0 {
        return envelope;
    }

    let log_spec = mag_spec.mapv(|m| (1.0 + 100.0 * m).ln());

    for t in 1..n_frames {
        let mut frame_flux = 0.0;
        for f in 0..n_bins {
            let diff = log_spec[[f, t]] - log_spec[[f, t - 1]];
            if diff > 0.0 {
                frame_flux += diff;
            }
        }
        envelope[t] = frame_flux / n_bins as f32;
    }

    envelope
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_signal_has_no_frames() {
        let data = stft(&[0.0; 100], 256, 64, 8000);
        assert_eq!(data.n_frames(), 0);
        assert!(onset_envelope(&magnitude_spectrogram(&data)).is_empty());
    }

    #[test]
    fn test_onset_envelope_peaks_at_click() {
        let sr = 8000;
        let mut y = vec![0.0f32; sr as usize];
        for sample in y.iter_mut().skip(4000).take(64) {
            *sample = 1.0;
        }
        let data = stft(&y, 256, 64, sr);
        let env = onset_envelope(&magnitude_spectrogram(&data));
        let peak = env
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        let peak_time = data.times[peak];
        assert!((peak_time - 0.5).abs() < 0.05, "peak at {}", peak_time);
    }
}
