//! Stand-in encoder for tests that run without ffmpeg installed.

use std::path::{Path, PathBuf};

/// Reads the concat list given after `-i` the way ffmpeg's concat demuxer
/// does: relative `file` entries resolve against the list's own directory.
/// Exits non-zero if the list is missing, has no entries, or names a frame
/// that does not exist; otherwise writes `mp4` to the last argument.
const FAKE_FFMPEG: &str = r##"#!/bin/sh
list=""
prev=""
out=""
for arg in "$@"; do
    if [ "$prev" = "-i" ]; then list="$arg"; fi
    prev="$arg"
    out="$arg"
done
if [ -z "$list" ] || [ ! -f "$list" ]; then
    echo "concat list not found: $list" >&2
    exit 1
fi
base=$(dirname "$list")
entries=0
while IFS= read -r line; do
    case "$line" in
        "file '"*)
            entry=$(printf '%s\n' "$line" | sed -e "s/^file '//" -e "s/'\$//" -e "s/'\\\\''/'/g")
            case "$entry" in
                /*) resolved="$entry" ;;
                *) resolved="$base/$entry" ;;
            esac
            if [ ! -f "$resolved" ]; then
                echo "$list: impossible to open '$resolved'" >&2
                exit 1
            fi
            entries=$((entries + 1))
            ;;
    esac
done < "$list"
if [ "$entries" -eq 0 ]; then
    echo "$list: no file entries" >&2
    exit 1
fi
printf 'mp4' > "$out"
"##;

/// Write the stand-in into `dir` and return its path.
#[cfg(unix)]
pub fn fake_ffmpeg(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    std::fs::create_dir_all(dir).unwrap();
    let script = dir.join("fake-ffmpeg.sh");
    std::fs::write(&script, FAKE_FFMPEG).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    script
}
