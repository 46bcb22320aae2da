//! Frame manifests in ffmpeg concat-demuxer format.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use brat_core::{BratError, BratResult};

/// Display durations, in seconds, assigned to captured frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTiming {
    /// Every frame except the last.
    pub step: f64,
    /// The last frame, held so the full text stays on screen.
    pub hold: f64,
}

impl Default for FrameTiming {
    fn default() -> Self {
        Self {
            step: 0.5,
            hold: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    pub path: PathBuf,
    pub duration: f64,
}

/// Ordered frame files with their display durations, in capture order.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameManifest {
    entries: Vec<ManifestEntry>,
}

impl FrameManifest {
    /// Build a manifest where the final frame gets `timing.hold` and every
    /// other frame gets `timing.step`.
    pub fn from_frames<P: AsRef<Path>>(frames: &[P], timing: FrameTiming) -> BratResult<Self> {
        if frames.is_empty() {
            return Err(BratError::Encode("no frames to encode".into()));
        }
        if timing.hold <= timing.step {
            return Err(BratError::InvalidArgument(format!(
                "hold duration {} must exceed frame duration {}",
                timing.hold, timing.step
            )));
        }
        let last = frames.len() - 1;
        let entries = frames
            .iter()
            .enumerate()
            .map(|(i, p)| ManifestEntry {
                path: p.as_ref().to_path_buf(),
                duration: if i == last { timing.hold } else { timing.step },
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total playback time in seconds.
    pub fn total_duration(&self) -> f64 {
        self.entries.iter().map(|e| e.duration).sum()
    }

    /// Serialize as a concat list: one `file` line and one `duration` line
    /// per entry, each newline-terminated.
    pub fn to_concat(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let _ = writeln!(out, "file '{}'", escape_concat_path(&entry.path));
            let _ = writeln!(out, "duration {}", entry.duration);
        }
        out
    }
}

/// Quote a path for a single-quoted concat `file` directive.
///
/// The concat demuxer has no escape inside quotes, so a literal `'` closes
/// the string, emits an escaped quote and reopens it.
fn escape_concat_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', r"'\''")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(n: usize) -> Vec<PathBuf> {
        (0..n)
            .map(|i| PathBuf::from(format!("/tmp/brat_1/frame_{i}.png")))
            .collect()
    }

    #[test]
    fn test_single_frame_gets_hold() {
        let m = FrameManifest::from_frames(&paths(1), FrameTiming::default()).unwrap();
        assert_eq!(m.len(), 1);
        assert_eq!(m.entries()[0].duration, 2.0);
        assert_eq!(m.to_concat(), "file '/tmp/brat_1/frame_0.png'\nduration 2\n");
    }

    #[test]
    fn test_last_frame_is_held_longest() {
        let m = FrameManifest::from_frames(&paths(5), FrameTiming::default()).unwrap();
        let durations: Vec<f64> = m.entries().iter().map(|e| e.duration).collect();
        assert_eq!(durations, vec![0.5, 0.5, 0.5, 0.5, 2.0]);
        let last = *durations.last().unwrap();
        assert!(durations[..4].iter().all(|d| *d < last));
        assert_eq!(m.total_duration(), 4.0);
    }

    #[test]
    fn test_concat_grammar_three_words() {
        let m = FrameManifest::from_frames(&paths(3), FrameTiming::default()).unwrap();
        let expected = "file '/tmp/brat_1/frame_0.png'\nduration 0.5\n\
                        file '/tmp/brat_1/frame_1.png'\nduration 0.5\n\
                        file '/tmp/brat_1/frame_2.png'\nduration 2\n";
        assert_eq!(m.to_concat(), expected);
        assert!(!m.to_concat().ends_with("\n\n"));
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let frames = paths(4);
        let a = FrameManifest::from_frames(&frames, FrameTiming::default()).unwrap();
        let b = FrameManifest::from_frames(&frames, FrameTiming::default()).unwrap();
        assert_eq!(a.to_concat(), b.to_concat());
        assert_eq!(a.to_concat(), a.to_concat());
    }

    #[test]
    fn test_custom_timing() {
        let timing = FrameTiming {
            step: 0.25,
            hold: 1.5,
        };
        let m = FrameManifest::from_frames(&paths(2), timing).unwrap();
        assert!(m.to_concat().contains("duration 0.25\n"));
        assert!(m.to_concat().ends_with("duration 1.5\n"));
    }

    #[test]
    fn test_rejects_empty_and_bad_timing() {
        let empty: Vec<PathBuf> = Vec::new();
        assert!(FrameManifest::from_frames(&empty, FrameTiming::default()).is_err());

        let flat = FrameTiming {
            step: 1.0,
            hold: 1.0,
        };
        assert!(FrameManifest::from_frames(&paths(2), flat).is_err());
    }

    #[test]
    fn test_quotes_in_path_are_escaped() {
        let m = FrameManifest::from_frames(&["/tmp/it's/frame_0.png"], FrameTiming::default())
            .unwrap();
        assert_eq!(
            m.to_concat(),
            "file '/tmp/it'\\''s/frame_0.png'\nduration 2\n"
        );
    }
}
