//! Output layout, placement and verification.
//!
//! Every capture unit maps to exactly one file:
//! `{root}/{story}/{story}-cover.{ext}` or `{root}/{story}/{story}-frame-{n}.{ext}`
//! with `n` one-based.

use crate::catalog::{render_url, CaptureUnit, Catalog, FrameSelector, StoryId};
use crate::config::{CaptureStrategy, ExportConfig};
use crate::result::{ExportError, ExportResult};
use crate::transcode::VideoContainer;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix of per-unit scratch directories inside the output root
pub const TEMP_DIR_PREFIX: &str = ".capture-";

// =============================================================================
// FORMATS
// =============================================================================

/// Container formats the pipeline writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    /// Animated GIF
    Gif,
    /// ISO base media (MP4)
    Mp4,
    /// Matroska/WebM
    Webm,
}

impl MediaFormat {
    /// Format written by a strategy
    #[must_use]
    pub const fn for_strategy(strategy: &CaptureStrategy) -> Self {
        match strategy {
            CaptureStrategy::Gif(_) => Self::Gif,
            CaptureStrategy::Video(video) => match video.container {
                VideoContainer::Mp4 => Self::Mp4,
                VideoContainer::Webm => Self::Webm,
            },
        }
    }

    /// File extension
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Gif => "gif",
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
        }
    }

    /// Identify a file from its leading bytes
    #[must_use]
    pub fn sniff(header: &[u8]) -> Option<Self> {
        if header.starts_with(b"GIF87a") || header.starts_with(b"GIF89a") {
            Some(Self::Gif)
        } else if header.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
            Some(Self::Webm)
        } else if header.len() >= 8 && &header[4..8] == b"ftyp" {
            Some(Self::Mp4)
        } else {
            None
        }
    }
}

impl std::fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Check that `path` is non-empty and carries `expected`'s signature.
///
/// # Errors
///
/// Returns [`ExportError::InvalidOutput`] on an empty file or a signature
/// mismatch, and [`ExportError::Io`] if the file cannot be read.
pub fn verify_output(path: &Path, expected: MediaFormat) -> ExportResult<u64> {
    use std::io::Read;

    let len = std::fs::metadata(path)?.len();
    if len == 0 {
        return Err(ExportError::InvalidOutput {
            path: path.to_path_buf(),
            message: "file is empty".to_string(),
        });
    }

    let mut header = [0u8; 12];
    let mut file = std::fs::File::open(path)?;
    let read = file.read(&mut header)?;
    match MediaFormat::sniff(&header[..read]) {
        Some(found) if found == expected => Ok(len),
        Some(found) => Err(ExportError::InvalidOutput {
            path: path.to_path_buf(),
            message: format!("expected {expected}, found {found}"),
        }),
        None => Err(ExportError::InvalidOutput {
            path: path.to_path_buf(),
            message: format!("no {expected} signature"),
        }),
    }
}

// =============================================================================
// LAYOUT
// =============================================================================

/// Deterministic mapping from (story, selector) to output paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
    extension: &'static str,
}

impl OutputLayout {
    /// Layout under `root` with a fixed extension
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, extension: &'static str) -> Self {
        Self {
            root: root.into(),
            extension,
        }
    }

    /// Layout for a configuration
    #[must_use]
    pub fn for_config(config: &ExportConfig) -> Self {
        Self::new(&config.output_dir, config.strategy.extension())
    }

    /// Output root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File extension
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        self.extension
    }

    /// Directory holding a story's outputs
    #[must_use]
    pub fn story_dir(&self, story: &StoryId) -> PathBuf {
        self.root.join(story.as_str())
    }

    /// Output path for one unit
    #[must_use]
    pub fn path_for(&self, story: &StoryId, selector: FrameSelector) -> PathBuf {
        let file = match selector.ordinal() {
            None => format!("{story}-cover.{}", self.extension),
            Some(n) => format!("{story}-frame-{n}.{}", self.extension),
        };
        self.story_dir(story).join(file)
    }

    /// Expand a catalog into capture units, cover first per story
    pub fn units(&self, catalog: &Catalog, base_url: &str) -> ExportResult<Vec<CaptureUnit>> {
        let mut units = Vec::with_capacity(catalog.unit_count());
        for story in catalog.stories() {
            for selector in story.selectors() {
                units.push(CaptureUnit {
                    story: story.id.clone(),
                    selector,
                    url: render_url(base_url, &story.id, selector)?,
                    output: self.path_for(&story.id, selector),
                });
            }
        }
        Ok(units)
    }

    /// Per-unit scratch directory under the output root.
    ///
    /// Keeping it on the same filesystem lets placement be a rename.
    pub fn scratch_dir(&self) -> ExportResult<tempfile::TempDir> {
        ensure_dir(&self.root)?;
        Ok(tempfile::Builder::new()
            .prefix(TEMP_DIR_PREFIX)
            .tempdir_in(&self.root)?)
    }

    /// Scratch directories currently present under the root
    pub fn leftover_scratch_dirs(&self) -> ExportResult<Vec<PathBuf>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir()
                && entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with(TEMP_DIR_PREFIX)
            {
                found.push(entry.path());
            }
        }
        found.sort();
        Ok(found)
    }
}

/// Create a directory and its parents; existing directories are fine.
pub fn ensure_dir(path: &Path) -> ExportResult<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Move a finished artifact to its final path, replacing any previous run's file.
///
/// The parent directory is created if needed. `staged` must be on the same
/// filesystem as `dest`.
pub fn place(staged: &Path, dest: &Path) -> ExportResult<u64> {
    if let Some(parent) = dest.parent() {
        ensure_dir(parent)?;
    }
    if cfg!(windows) && dest.exists() {
        std::fs::remove_file(dest)?;
    }
    std::fs::rename(staged, dest)?;
    Ok(std::fs::metadata(dest)?.len())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::catalog::StoryEntry;
    use tempfile::TempDir;

    fn id(s: &str) -> StoryId {
        StoryId::new(s).unwrap()
    }

    mod path_tests {
        use super::*;

        #[test]
        fn test_cover_path() {
            let layout = OutputLayout::new("exports", "gif");
            assert_eq!(
                layout.path_for(&id("welcome"), FrameSelector::Cover),
                PathBuf::from("exports/welcome/welcome-cover.gif")
            );
        }

        #[test]
        fn test_frame_path_is_one_based() {
            let layout = OutputLayout::new("exports", "mp4");
            assert_eq!(
                layout.path_for(&id("welcome"), FrameSelector::Frame(0)),
                PathBuf::from("exports/welcome/welcome-frame-1.mp4")
            );
        }

        #[test]
        fn test_units_order() {
            let catalog = Catalog::new(vec![
                StoryEntry::new("a", 2).unwrap(),
                StoryEntry::new("b", 0).unwrap(),
            ])
            .unwrap();
            let layout = OutputLayout::new("out", "gif");
            let units = layout.units(&catalog, "http://localhost/export").unwrap();
            let labels: Vec<_> = units.iter().map(CaptureUnit::label).collect();
            assert_eq!(labels, vec!["a/cover", "a/frame-1", "a/frame-2", "b/cover"]);
            assert_eq!(units[1].url, "http://localhost/export?story=a&frame=0");
            assert_eq!(units[3].output, PathBuf::from("out/b/b-cover.gif"));
        }
    }

    mod format_tests {
        use super::*;

        #[test]
        fn test_sniff() {
            assert_eq!(MediaFormat::sniff(b"GIF89a\x01\x00"), Some(MediaFormat::Gif));
            assert_eq!(MediaFormat::sniff(b"GIF87a"), Some(MediaFormat::Gif));
            assert_eq!(
                MediaFormat::sniff(&[0x1A, 0x45, 0xDF, 0xA3, 0x01]),
                Some(MediaFormat::Webm)
            );
            assert_eq!(
                MediaFormat::sniff(b"\x00\x00\x00\x20ftypisom"),
                Some(MediaFormat::Mp4)
            );
            assert_eq!(MediaFormat::sniff(b"\x89PNG\r\n\x1a\n"), None);
            assert_eq!(MediaFormat::sniff(b""), None);
        }

        #[test]
        fn test_verify_output() {
            let dir = TempDir::new().unwrap();
            let good = dir.path().join("a.gif");
            std::fs::write(&good, b"GIF89a0000").unwrap();
            assert_eq!(verify_output(&good, MediaFormat::Gif).unwrap(), 10);

            let wrong = dir.path().join("b.mp4");
            std::fs::write(&wrong, b"GIF89a0000").unwrap();
            assert!(matches!(
                verify_output(&wrong, MediaFormat::Mp4),
                Err(ExportError::InvalidOutput { .. })
            ));

            let empty = dir.path().join("c.gif");
            std::fs::write(&empty, b"").unwrap();
            assert!(verify_output(&empty, MediaFormat::Gif).is_err());
        }
    }

    mod placement_tests {
        use super::*;

        #[test]
        fn test_ensure_dir_idempotent() {
            let dir = TempDir::new().unwrap();
            let nested = dir.path().join("x/y");
            ensure_dir(&nested).unwrap();
            ensure_dir(&nested).unwrap();
            assert!(nested.is_dir());
        }

        #[test]
        fn test_place_overwrites() {
            let dir = TempDir::new().unwrap();
            let dest = dir.path().join("story/story-cover.gif");

            let first = dir.path().join("first");
            std::fs::write(&first, b"old").unwrap();
            place(&first, &dest).unwrap();

            let second = dir.path().join("second");
            std::fs::write(&second, b"newer").unwrap();
            assert_eq!(place(&second, &dest).unwrap(), 5);
            assert_eq!(std::fs::read(&dest).unwrap(), b"newer");
            assert!(!second.exists());
        }

        #[test]
        fn test_scratch_dirs_are_tracked() {
            let dir = TempDir::new().unwrap();
            let layout = OutputLayout::new(dir.path().join("exports"), "gif");
            assert!(layout.leftover_scratch_dirs().unwrap().is_empty());

            let scratch = layout.scratch_dir().unwrap();
            assert_eq!(layout.leftover_scratch_dirs().unwrap().len(), 1);
            scratch.close().unwrap();
            assert!(layout.leftover_scratch_dirs().unwrap().is_empty());
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn selector() -> impl Strategy<Value = FrameSelector> {
            (-1i64..50).prop_map(FrameSelector::from_index)
        }

        proptest! {
            #[test]
            fn prop_path_deterministic(story in "[a-z][a-z0-9_-]{0,12}", sel in selector()) {
                let layout = OutputLayout::new("exports", "gif");
                let story = StoryId::new(story).unwrap();
                prop_assert_eq!(layout.path_for(&story, sel), layout.path_for(&story, sel));
            }

            #[test]
            fn prop_paths_never_collide(
                a in "[a-z][a-z0-9_-]{0,12}",
                b in "[a-z][a-z0-9_-]{0,12}",
                sa in selector(),
                sb in selector(),
            ) {
                prop_assume!(a != b || sa != sb);
                let layout = OutputLayout::new("exports", "webm");
                let pa = layout.path_for(&StoryId::new(a).unwrap(), sa);
                let pb = layout.path_for(&StoryId::new(b).unwrap(), sb);
                prop_assert_ne!(pa, pb);
            }
        }
    }
}
