//! End-to-end runs: resolve, detect, normalise, write

use downbeat_sync::{Capabilities, Config, DownbeatSync, FileResolver, OutputProfile, Strategy};
use serde_json::Value;
use std::path::Path;

/// Silent mono WAV of the given length
fn write_wav(path: &Path, seconds: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for _ in 0..seconds * 8000 {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();
}

/// Fallback-only processor rooted at `dir`
fn processor(dir: &Path, config: Config) -> DownbeatSync {
    let resolver = FileResolver::new(dir, config.resolver.fallback_names.clone());
    DownbeatSync::with_resolver(config, Capabilities::new(), resolver)
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_input_writes_failure_record() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("result.json");

        let result = processor(dir.path(), Config::default())
            .process("x.mp3", &output)
            .unwrap();
        assert!(!result.success);

        let value = read_json(&output);
        assert_eq!(value["success"], false);
        assert!(!value["error"].as_str().unwrap().is_empty());
        assert_eq!(value["downbeats"], serde_json::json!([]));
        assert_eq!(value["count"], 0);
    }

    #[test]
    fn test_fallback_success_simple_profile() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("song.wav"), 5);
        let output = dir.path().join("result.json");

        let mut config = Config::default();
        config.resolver.fallback_names = vec!["song.wav".to_string()];
        let result = processor(dir.path(), config)
            .process("missing.wav", &output)
            .unwrap();
        assert!(result.success);
        assert_eq!(result.method, Some(Strategy::Fallback));

        let value = read_json(&output);
        assert_eq!(value["success"], true);
        assert_eq!(value["downbeats"], serde_json::json!([0.0, 2.0, 4.0]));
        assert_eq!(value["count"], 3);
        assert_eq!(value["audio_file"], "song.wav");
        assert_eq!(value["method"], "fallback");
    }

    #[test]
    fn test_frames_profile_record() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("clip.wav");
        write_wav(&input, 5);
        let output = dir.path().join("frames.json");

        let mut config = Config::default();
        config.output.profile = OutputProfile::Frames;
        config.output.video_fps = 30.0;
        processor(dir.path(), config).process(&input, &output).unwrap();

        let value = read_json(&output);
        assert_eq!(value["downbeat_frames"], serde_json::json!([0, 60, 120]));
        assert_eq!(value["downbeat_times"], serde_json::json!([0.0, 2.0, 4.0]));
        assert_eq!(value["audio_file"], input.display().to_string());
        assert_eq!(value["processing_info"]["video_fps"], 30.0);
        assert_eq!(value["processing_info"]["fps"], 100.0);
        assert_eq!(value["processing_info"]["beats_per_bar"], 4);
    }

    #[test]
    fn test_repeated_runs_are_identical() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("clip.wav");
        write_wav(&input, 7);

        let mut sync = processor(dir.path(), Config::default());
        let first = sync.process(&input, dir.path().join("a.json")).unwrap();
        let second = sync.process(&input, dir.path().join("b.json")).unwrap();

        assert_eq!(first.downbeats, second.downbeats);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.json")).unwrap(),
            std::fs::read_to_string(dir.path().join("b.json")).unwrap()
        );
    }

    #[test]
    fn test_existing_output_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("result.json");
        std::fs::write(&output, "stale").unwrap();

        processor(dir.path(), Config::default())
            .process("nothing.wav", &output)
            .unwrap();
        assert_eq!(read_json(&output)["success"], false);
    }
}
