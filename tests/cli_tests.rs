//! Exit status and record output of the `downbeat-sync` binary

use serde_json::Value;
use std::path::Path;
use std::process::{Command, Output};

/// Run the binary with `dir` as working directory
fn run_cli(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_downbeat-sync"))
        .args(args)
        .current_dir(dir)
        .env("RUST_LOG", "off")
        .output()
        .unwrap()
}

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

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn assert_failure_record(path: &Path) {
    let value = read_json(path);
    assert_eq!(value["success"], false);
    assert!(!value["error"].as_str().unwrap().is_empty());
    assert_eq!(value["downbeats"], serde_json::json!([]));
    assert_eq!(value["count"], 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_exits_zero() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("clip.wav"), 5);

        let output = run_cli(
            dir.path(),
            &["run", "clip.wav", "out.json", "--strategy", "fallback", "-q"],
        );
        assert!(output.status.success());
        assert_eq!(output.status.code(), Some(0));
        assert_eq!(read_json(&dir.path().join("out.json"))["count"], 3);
    }

    #[test]
    fn test_missing_input_exits_one_with_record() {
        let dir = tempfile::tempdir().unwrap();

        let output = run_cli(dir.path(), &["run", "x.mp3", "out.json", "-q"]);
        assert_eq!(output.status.code(), Some(1));
        assert_failure_record(&dir.path().join("out.json"));
    }

    #[test]
    fn test_verbose_and_quiet_write_failure_record() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("clip.wav"), 5);

        let output = run_cli(dir.path(), &["run", "clip.wav", "out.json", "-v", "-q"]);
        assert_eq!(output.status.code(), Some(1));
        assert_failure_record(&dir.path().join("out.json"));
    }

    #[test]
    fn test_non_finite_video_fps_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("clip.wav"), 5);

        let output = run_cli(
            dir.path(),
            &["run", "clip.wav", "out.json", "--video-fps", "NaN", "-q"],
        );
        assert_eq!(output.status.code(), Some(1));
        assert_failure_record(&dir.path().join("out.json"));
    }

    #[test]
    fn test_argument_errors_exit_one() {
        let dir = tempfile::tempdir().unwrap();

        let output = run_cli(dir.path(), &["run", "only-input.wav"]);
        assert_eq!(output.status.code(), Some(1));

        let output = run_cli(dir.path(), &["--help"]);
        assert_eq!(output.status.code(), Some(0));
    }
}
