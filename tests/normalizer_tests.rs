//! Downbeat filtering and frame conversion

use downbeat_sync::analysis::time_to_frame;
use downbeat_sync::{DetectionEvent, DownbeatSequence};

/// Events for `bars` bars of 4/4 at one beat per second
fn four_four_events(bars: usize) -> Vec<DetectionEvent> {
    (0..bars * 4)
        .map(|i| DetectionEvent::new(i as f64, (i % 4) as u32 + 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_is_order_preserving() {
        let events = four_four_events(5);
        let downbeats = DownbeatSequence::from_events(&events);

        let expected: Vec<f64> = events
            .iter()
            .filter(|e| e.position == 1)
            .map(|e| e.time_sec)
            .collect();
        assert_eq!(downbeats.times(), expected.as_slice());
        assert_eq!(downbeats.times(), &[0.0, 4.0, 8.0, 12.0, 16.0]);
    }

    #[test]
    fn test_unknown_positions_are_not_downbeats() {
        let events = vec![
            DetectionEvent::new(0.2, 0),
            DetectionEvent::new(0.7, 0),
            DetectionEvent::new(1.2, 1),
        ];
        assert_eq!(DownbeatSequence::from_events(&events).times(), &[1.2]);
    }

    #[test]
    fn test_frame_conversion_pinned_values() {
        assert_eq!(time_to_frame(1.5, 60.0), 90);
        assert_eq!(time_to_frame(0.0083333, 60.0), 0);
        assert_eq!(time_to_frame(0.0, 60.0), 0);
    }

    #[test]
    fn test_frame_ties_round_away_from_zero() {
        // Exact halves at 2 fps
        assert_eq!(time_to_frame(0.25, 2.0), 1);
        assert_eq!(time_to_frame(0.75, 2.0), 2);
        assert_eq!(time_to_frame(1.25, 2.0), 3);
    }

    #[test]
    fn test_frames_follow_downbeat_order() {
        let downbeats = DownbeatSequence::from_events(&four_four_events(3));
        let frames = downbeats.to_frames(30.0);
        assert_eq!(frames.frames(), &[0, 120, 240]);
        assert_eq!(frames.len(), downbeats.len());
    }

    #[test]
    fn test_empty_events() {
        let downbeats = DownbeatSequence::from_events(&[]);
        assert!(downbeats.is_empty());
        assert!(downbeats.to_frames(60.0).is_empty());
    }
}
