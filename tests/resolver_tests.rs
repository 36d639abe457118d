//! File resolution precedence and not-found reporting

use downbeat_sync::{DownbeatError, FileResolver};
use std::path::{Path, PathBuf};

/// Resolver over a scratch directory with the default fallback names
fn resolver_in(dir: &Path) -> FileResolver {
    FileResolver::new(
        dir,
        vec!["song.mp3".to_string(), "song_converted.mp3".to_string()],
    )
}

fn touch(dir: &Path, name: &str) {
    std::fs::write(dir.join(name), b"audio").unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nominal_path_wins_when_present() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "x.mp3");
        touch(dir.path(), "song.mp3");

        let audio = resolver_in(dir.path()).resolve("x.mp3").unwrap();
        assert_eq!(audio.requested(), Path::new("x.mp3"));
        assert_eq!(audio.location(), dir.path().join("x.mp3"));
    }

    #[test]
    fn test_first_fallback_wins_over_later_ones() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "song.mp3");
        touch(dir.path(), "song_converted.mp3");

        let audio = resolver_in(dir.path()).resolve("x.mp3").unwrap();
        assert_eq!(audio.requested(), Path::new("song.mp3"));
    }

    #[test]
    fn test_converted_variant_used_when_alone() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "song_converted.mp3");

        let audio = resolver_in(dir.path()).resolve("x.mp3").unwrap();
        assert_eq!(audio.requested(), Path::new("song_converted.mp3"));
    }

    #[test]
    fn test_absolute_nominal_path() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        touch(other.path(), "track.wav");

        let nominal = other.path().join("track.wav");
        let audio = resolver_in(dir.path()).resolve(&nominal).unwrap();
        assert_eq!(audio.location(), nominal);
    }

    #[test]
    fn test_not_found_lists_every_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolver_in(dir.path()).resolve("x.mp3").unwrap_err();

        match &err {
            DownbeatError::FileNotFound { tried } => {
                assert_eq!(tried.len(), 5);
                assert_eq!(tried[0], PathBuf::from("x.mp3"));
                assert_eq!(tried[4], dir.path().join("song_converted.mp3"));
            }
            other => panic!("unexpected error {:?}", other),
        }

        let message = err.record_message();
        assert!(message.starts_with("Audio file not found. Tried: x.mp3, song.mp3"));
    }
}
