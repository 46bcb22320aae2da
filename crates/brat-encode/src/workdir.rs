//! Per-request scratch directories for frames, manifest and output.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use brat_core::BratResult;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

const MANIFEST_FILE: &str = "input.txt";
const OUTPUT_FILE: &str = "output.mp4";

/// A uniquely named directory under the artifacts root, owned by one request.
///
/// The path is always absolute: ffmpeg's concat demuxer resolves relative
/// `file` entries against the list's own directory, not the working one.
///
/// The directory is removed by [`WorkingDirectory::remove`] or, failing that,
/// when the value is dropped. Removal never fails loudly and runs on the
/// blocking pool when a tokio runtime is available.
#[derive(Debug)]
pub struct WorkingDirectory {
    path: PathBuf,
    removed: bool,
}

impl WorkingDirectory {
    /// Create `<root>/brat_<unix-nanos>`, adding a sequence suffix if two
    /// requests land on the same timestamp. A relative `root` is resolved
    /// against the current directory.
    pub fn create(root: &Path) -> BratResult<Self> {
        let root = std::path::absolute(root)?;
        std::fs::create_dir_all(&root)?;
        let nanos = chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default();
        let mut name = format!("brat_{nanos}");
        loop {
            let path = root.join(&name);
            match std::fs::create_dir(&path) {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "working directory created");
                    return Ok(Self {
                        path,
                        removed: false,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
                    name = format!("brat_{nanos}_{seq}");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frame_path(&self, index: usize) -> PathBuf {
        self.path.join(format!("frame_{index}.png"))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.path.join(MANIFEST_FILE)
    }

    pub fn output_path(&self) -> PathBuf {
        self.path.join(OUTPUT_FILE)
    }

    /// Delete the directory and everything in it, waiting for the removal
    /// to finish. A directory that is already gone counts as success; other
    /// failures are only logged.
    pub async fn remove(mut self) {
        let Some(path) = self.take_path() else {
            return;
        };
        let blocking = path.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || remove_dir(&blocking)).await {
            tracing::warn!(path = %path.display(), error = %e, "working directory removal aborted");
        }
    }

    fn take_path(&mut self) -> Option<PathBuf> {
        if self.removed {
            return None;
        }
        self.removed = true;
        Some(self.path.clone())
    }
}

impl Drop for WorkingDirectory {
    fn drop(&mut self) {
        let Some(path) = self.take_path() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_dir(&path));
            }
            Err(_) => remove_dir(&path),
        }
    }
}

fn remove_dir(path: &Path) {
    match std::fs::remove_dir_all(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "working directory removed"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "failed to remove working directory"
        ),
    }
}
