//! Peak-picking tracker for frame-wise beat/downbeat activations
//!
//! Beats and downbeats are picked independently as local maxima above a
//! threshold. Each downbeat is then snapped to its nearest beat and every
//! beat is labelled with its position in the bar.

use super::ActivationMatrix;
use crate::analysis::DetectionEvent;

/// Position used for beats that precede no known downbeat
pub const UNKNOWN_POSITION: u32 = 0;

#[derive(Debug, Clone)]
pub struct PeakTracker {
    /// Activation must exceed this to count as a peak
    pub threshold: f32,
    /// Max-pool window in frames (odd)
    pub window: usize,
}

impl PeakTracker {
    pub fn new(threshold: f32, window: usize) -> Self {
        Self { threshold, window }
    }

    /// Labelled beat events from an activation matrix
    pub fn track(
        &self,
        activations: &ActivationMatrix,
        beats_per_bar: u32,
        fps: f32,
    ) -> Vec<DetectionEvent> {
        let data = activations.data();
        if data.ncols() < 2 || fps <= 0.0 {
            return Vec::new();
        }

        let beat_col: Vec<f32> = data.column(0).to_vec();
        let down_col: Vec<f32> = data.column(1).to_vec();

        let to_sec = |frame: usize| frame as f64 / fps as f64;
        let beats: Vec<f64> = self.find_peaks(&beat_col).into_iter().map(to_sec).collect();
        let downbeats: Vec<f64> = self.find_peaks(&down_col).into_iter().map(to_sec).collect();

        if beats.is_empty() {
            return downbeats.into_iter().map(DetectionEvent::downbeat).collect();
        }

        let downbeat_idx = snap_to_beats(&beats, &downbeats);
        label_positions(&beats, &downbeat_idx, beats_per_bar.max(1))
    }

    /// Frames that are the maximum of their pooling window and above threshold
    pub fn find_peaks(&self, activations: &[f32]) -> Vec<usize> {
        let len = activations.len();
        let half = self.window / 2;

        let peaks: Vec<usize> = (0..len)
            .filter(|&i| activations[i] > self.threshold)
            .filter(|&i| {
                let start = i.saturating_sub(half);
                let end = (i + half + 1).min(len);
                activations[start..end].iter().all(|&v| v <= activations[i])
            })
            .collect();

        merge_adjacent(&peaks, 1)
    }
}

/// Collapse runs of peaks closer than `width` frames into their rounded mean
fn merge_adjacent(peaks: &[usize], width: usize) -> Vec<usize> {
    let Some(&first) = peaks.first() else {
        return Vec::new();
    };

    let mut merged = Vec::new();
    let mut mean = first as f32;
    let mut count = 1.0;

    for &peak in &peaks[1..] {
        if peak as f32 - mean <= width as f32 {
            count += 1.0;
            mean += (peak as f32 - mean) / count;
        } else {
            merged.push(mean.round() as usize);
            mean = peak as f32;
            count = 1.0;
        }
    }
    merged.push(mean.round() as usize);
    merged
}

/// Indices of the beats nearest to each downbeat, sorted and unique
fn snap_to_beats(beats: &[f64], downbeats: &[f64]) -> Vec<usize> {
    let mut indices: Vec<usize> = downbeats
        .iter()
        .filter_map(|&d| {
            beats
                .iter()
                .enumerate()
                .min_by(|a, b| {
                    (a.1 - d)
                        .abs()
                        .partial_cmp(&(b.1 - d).abs())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(i, _)| i)
        })
        .collect();
    indices.sort_unstable();
    indices.dedup();
    indices
}

/// Bar position per beat: 1 at a downbeat, counting up and wrapping at
/// `beats_per_bar`. Beats before the first downbeat count backwards from it.
fn label_positions(beats: &[f64], downbeat_idx: &[usize], beats_per_bar: u32) -> Vec<DetectionEvent> {
    let Some(&first_down) = downbeat_idx.first() else {
        return beats
            .iter()
            .map(|&t| DetectionEvent::new(t, UNKNOWN_POSITION))
            .collect();
    };

    let bpb = beats_per_bar as i64;
    let mut last_down = first_down as i64;
    let mut next = downbeat_idx.iter().peekable();

    beats
        .iter()
        .enumerate()
        .map(|(i, &t)| {
            if next.peek().map_or(false, |&&d| d == i) {
                next.next();
                last_down = i as i64;
            }
            let offset = (i as i64 - last_down).rem_euclid(bpb);
            DetectionEvent::new(t, offset as u32 + 1)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn activations(beat: &[usize], down: &[usize], n_frames: usize) -> ActivationMatrix {
        let mut data = Array2::<f32>::from_elem((n_frames, 2), -5.0);
        for &f in beat {
            data[[f, 0]] = 3.0;
        }
        for &f in down {
            data[[f, 1]] = 3.0;
        }
        ActivationMatrix::new(data)
    }

    #[test]
    fn test_find_peaks_respects_window_and_threshold() {
        let tracker = PeakTracker::new(0.0, 7);
        let logits = vec![-1.0, 0.5, 2.0, 1.0, -1.0, -1.0, 1.5, -1.0, -1.0, -1.0, -1.0, 0.8];
        // frame 6 is four frames from the larger peak, outside its window
        assert_eq!(tracker.find_peaks(&logits), vec![2, 6, 11]);
    }

    #[test]
    fn test_merge_adjacent_plateau() {
        assert_eq!(merge_adjacent(&[10, 11, 20], 1), vec![11, 20]);
        assert!(merge_adjacent(&[], 1).is_empty());
    }

    #[test]
    fn test_labels_count_from_downbeats() {
        let beats: Vec<usize> = (0..10).map(|i| 10 + i * 50).collect();
        // Downbeat activations one frame off the beats at index 2 and 6
        let acts = activations(&beats, &[111, 309], 600);
        let events = PeakTracker::new(0.0, 7).track(&acts, 4, 100.0);

        let positions: Vec<u32> = events.iter().map(|e| e.position).collect();
        assert_eq!(positions, vec![3, 4, 1, 2, 3, 4, 1, 2, 3, 4]);
        assert!((events[2].time_sec - 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_no_downbeats_leaves_positions_unknown() {
        let acts = activations(&[10, 60, 110], &[], 200);
        let events = PeakTracker::new(0.0, 7).track(&acts, 4, 100.0);
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.position == UNKNOWN_POSITION));
    }

    #[test]
    fn test_downbeats_without_beats() {
        let acts = activations(&[], &[50, 250], 300);
        let events = PeakTracker::new(0.0, 7).track(&acts, 4, 50.0);
        assert_eq!(events, vec![DetectionEvent::downbeat(1.0), DetectionEvent::downbeat(5.0)]);
    }
}
