//! End-to-end batch runs against the in-process browser.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::path::{Path, PathBuf};
use std::time::Duration;
use storyreel::{
    run_batch, BatchObserver, BatchSummary, BrowserOptions, CaptureStrategy, CaptureUnit,
    Catalog, ExportConfig, GifSettings, MockBrowser, NullObserver, OutputLayout,
    ReadinessConfig, StoryEntry, UnitReport, UnitState, Viewport,
};
use tempfile::TempDir;

// =============================================================================
// HELPERS
// =============================================================================

fn readiness(timeout_ms: u64) -> ReadinessConfig {
    let mut readiness = ReadinessConfig::default()
        .with_timeout(timeout_ms)
        .with_fallback_delay(10);
    readiness.initial_poll_ms = 5;
    readiness.max_poll_ms = 20;
    readiness
}

fn gif_config(out: &Path, fps: u32, duration_secs: u32) -> ExportConfig {
    let gif = GifSettings::default()
        .with_size(32, 48)
        .with_fps(fps)
        .with_duration(duration_secs);
    ExportConfig::default()
        .with_output_dir(out)
        .with_viewport(Viewport::new(64, 96))
        .with_strategy(CaptureStrategy::Gif(gif))
        .with_readiness(readiness(300))
        .with_browser(BrowserOptions::default().with_force_kill(false))
        .with_screenshot_timeout(2_000)
}

fn catalog(stories: &[(&str, u32)]) -> Catalog {
    Catalog::new(
        stories
            .iter()
            .map(|(id, frames)| StoryEntry::new(id, *frames).unwrap())
            .collect(),
    )
    .unwrap()
}

/// All regular files under `root`, relative and sorted
fn files_under(root: &Path) -> Vec<PathBuf> {
    fn walk(dir: &Path, root: &Path, out: &mut Vec<PathBuf>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(&path, root, out);
            } else {
                out.push(path.strip_prefix(root).unwrap().to_path_buf());
            }
        }
    }
    let mut out = Vec::new();
    if root.exists() {
        walk(root, root, &mut out);
    }
    out.sort();
    out
}

fn scratch_dirs(out: &Path) -> Vec<PathBuf> {
    OutputLayout::new(out, "gif").leftover_scratch_dirs().unwrap()
}

fn magic(path: &Path) -> Vec<u8> {
    std::fs::read(path).unwrap().into_iter().take(8).collect()
}

async fn run(mock: &MockBrowser, catalog: &Catalog, config: &ExportConfig) -> BatchSummary {
    run_batch(mock, catalog, config, &mut NullObserver)
        .await
        .unwrap()
}

// =============================================================================
// GIF PIPELINE
// =============================================================================

mod gif_pipeline {
    use super::*;

    #[tokio::test]
    async fn test_welcome_produces_cover_and_frame() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("exports");
        let mock = MockBrowser::new();

        let summary = run(&mock, &catalog(&[("welcome", 1)]), &gif_config(&out, 4, 1)).await;

        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.placed, 2);
        assert_eq!(
            files_under(&out),
            vec![
                PathBuf::from("welcome/welcome-cover.gif"),
                PathBuf::from("welcome/welcome-frame-1.gif"),
            ]
        );
        for file in files_under(&out) {
            let path = out.join(file);
            assert!(std::fs::metadata(&path).unwrap().len() > 0);
            assert!(magic(&path).starts_with(b"GIF89a") || magic(&path).starts_with(b"GIF87a"));
        }
        assert!(scratch_dirs(&out).is_empty());
    }

    #[tokio::test]
    async fn test_cover_is_captured_before_frames() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("exports");
        let summary = run(
            &MockBrowser::new(),
            &catalog(&[("classes", 2), ("socials", 1)]),
            &gif_config(&out, 2, 1),
        )
        .await;

        let order: Vec<_> = summary.units.iter().map(UnitReport::label).collect();
        assert_eq!(
            order,
            vec![
                "classes/cover",
                "classes/frame-1",
                "classes/frame-2",
                "socials/cover",
                "socials/frame-1"
            ]
        );
    }

    #[tokio::test]
    async fn test_frame_count_matches_fps_times_duration() {
        let dir = TempDir::new().unwrap();
        let mock = MockBrowser::new();
        let summary = run(&mock, &catalog(&[("teaser", 0)]), &gif_config(dir.path(), 8, 2)).await;

        assert_eq!(summary.placed, 1);
        assert_eq!(mock.calls().screenshots, 16);
    }

    #[tokio::test]
    async fn test_one_failing_unit_does_not_stop_batch() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("exports");
        let mock = MockBrowser::new().with_unknown_story("ghost");
        let stories = catalog(&[
            ("alpha", 0),
            ("ghost", 0),
            ("gamma", 0),
            ("delta", 0),
            ("omega", 0),
        ]);

        let summary = run(&mock, &stories, &gif_config(&out, 2, 1)).await;

        assert_eq!(summary.attempted, 5);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.placed, 4);
        let failed = &summary.units[1];
        assert_eq!(failed.state, UnitState::Failed);
        assert!(failed.error.as_deref().unwrap().contains("story=ghost"));
        for id in ["alpha", "gamma", "delta", "omega"] {
            assert!(out.join(id).join(format!("{id}-cover.gif")).is_file());
        }
        assert!(!out.join("ghost/ghost-cover.gif").exists());
        assert!(scratch_dirs(&out).is_empty());
    }

    #[tokio::test]
    async fn test_failed_screenshots_leave_no_temp_dirs() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("exports");
        std::fs::create_dir_all(&out).unwrap();
        let before = scratch_dirs(&out);
        let mock = MockBrowser::new().failing_screenshots_for("broken");

        let summary = run(
            &mock,
            &catalog(&[("broken", 1), ("fine", 0)]),
            &gif_config(&out, 2, 1),
        )
        .await;

        assert_eq!(summary.failed, 2);
        assert_eq!(summary.placed, 1);
        assert!(summary.units[0]
            .error
            .as_deref()
            .unwrap()
            .contains("Screenshot failed"));
        assert_eq!(scratch_dirs(&out), before);
    }

    #[tokio::test]
    async fn test_navigation_failure_is_unit_scoped() {
        let dir = TempDir::new().unwrap();
        let mock = MockBrowser::new().failing_navigation_for("offline");
        let summary = run(
            &mock,
            &catalog(&[("offline", 0), ("online", 0)]),
            &gif_config(dir.path(), 2, 1),
        )
        .await;
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.placed, 1);
        assert!(summary.units[0].error.as_deref().unwrap().contains("Navigation"));
    }

    #[tokio::test]
    async fn test_rerun_overwrites_in_place() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("exports");
        let stories = catalog(&[("welcome", 1)]);
        let config = gif_config(&out, 2, 1);

        run(&MockBrowser::new(), &stories, &config).await;
        let first = files_under(&out);
        run(&MockBrowser::new(), &stories, &config).await;

        assert_eq!(files_under(&out), first);
        assert_eq!(first.len(), 2);
        assert!(scratch_dirs(&out).is_empty());
    }

    #[tokio::test]
    async fn test_readiness_timeout_still_captures() {
        let dir = TempDir::new().unwrap();
        let mock = MockBrowser::new().withholding_signal("data-animations-ready");
        let config = gif_config(dir.path(), 2, 1).with_readiness(readiness(100));

        let started = std::time::Instant::now();
        let summary = run(&mock, &catalog(&[("slowpoke", 0)]), &config).await;

        assert_eq!(summary.placed, 1);
        assert_eq!(summary.units[0].ready, Some(false));
        assert_eq!(mock.calls().screenshots, 2);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}

// =============================================================================
// SESSION LIFECYCLE
// =============================================================================

mod session_lifecycle {
    use super::*;

    #[tokio::test]
    async fn test_launch_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mock = MockBrowser::new().failing_launch();
        let err = run_batch(
            &mock,
            &catalog(&[("welcome", 1)]),
            &gif_config(dir.path(), 2, 1),
            &mut NullObserver,
        )
        .await
        .unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(mock.calls().contexts_opened, 0);
    }

    #[tokio::test]
    async fn test_one_session_isolated_contexts() {
        let dir = TempDir::new().unwrap();
        let mock = MockBrowser::new().with_unknown_story("ghost");
        run(
            &mock,
            &catalog(&[("welcome", 1), ("ghost", 0), ("contact", 0)]),
            &gif_config(dir.path(), 2, 1),
        )
        .await;

        let calls = mock.calls();
        assert_eq!(calls.launches, 1);
        assert_eq!(calls.session_closes, 1);
        assert_eq!(calls.contexts_opened, 4);
        assert_eq!(calls.contexts_closed, 4);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_launch() {
        let dir = TempDir::new().unwrap();
        let mock = MockBrowser::new();
        let config = gif_config(dir.path(), 0, 1);
        let err = run_batch(&mock, &catalog(&[("welcome", 0)]), &config, &mut NullObserver)
            .await
            .unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(mock.calls().launches, 0);
    }

    #[derive(Default)]
    struct Recorder {
        started: Option<usize>,
        unit_starts: Vec<String>,
        finished: Vec<(usize, UnitState)>,
        summary: Option<BatchSummary>,
    }

    impl BatchObserver for Recorder {
        fn on_batch_start(&mut self, total: usize, _config: &ExportConfig) {
            self.started = Some(total);
        }

        fn on_unit_start(&mut self, _index: usize, unit: &CaptureUnit) {
            self.unit_starts.push(unit.label());
        }

        fn on_unit_finish(&mut self, index: usize, report: &UnitReport) {
            self.finished.push((index, report.state));
        }

        fn on_batch_finish(&mut self, summary: &BatchSummary) {
            self.summary = Some(summary.clone());
        }
    }

    #[tokio::test]
    async fn test_observer_sees_every_unit() {
        let dir = TempDir::new().unwrap();
        let mock = MockBrowser::new().with_unknown_story("ghost");
        let mut observer = Recorder::default();
        run_batch(
            &mock,
            &catalog(&[("welcome", 1), ("ghost", 0)]),
            &gif_config(dir.path(), 2, 1),
            &mut observer,
        )
        .await
        .unwrap();

        assert_eq!(observer.started, Some(3));
        assert_eq!(
            observer.unit_starts,
            vec!["welcome/cover", "welcome/frame-1", "ghost/cover"]
        );
        assert_eq!(
            observer.finished,
            vec![
                (0, UnitState::Placed),
                (1, UnitState::Placed),
                (2, UnitState::Failed)
            ]
        );
        assert_eq!(observer.summary.unwrap().failed, 1);
    }

    #[tokio::test]
    async fn test_summary_written_as_json() {
        let dir = TempDir::new().unwrap();
        let summary = run(
            &MockBrowser::new(),
            &catalog(&[("welcome", 0)]),
            &gif_config(&dir.path().join("out"), 2, 1),
        )
        .await;
        let path = dir.path().join("summary.json");
        summary.write_json(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["placed"], 1);
        assert_eq!(json["strategy"], "gif");
        assert_eq!(json["units"][0]["visual"], "cover");
    }
}

// =============================================================================
// VIDEO PIPELINE
// =============================================================================

#[cfg(unix)]
mod video_pipeline {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use storyreel::{VideoContainer, VideoSettings};

    /// Encoder stand-in that writes an MP4 `ftyp` box to its last argument
    fn stub_encoder(dir: &Path) -> PathBuf {
        let path = dir.join("fake-ffmpeg.sh");
        std::fs::write(
            &path,
            "#!/bin/sh\nfor last; do :; done\nprintf '\\000\\000\\000\\030ftypisom\\000\\000\\002\\000' > \"$last\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn video_config(out: &Path, encoder: &Path, file_wait_ms: u64) -> ExportConfig {
        let video = VideoSettings::new(VideoContainer::Mp4)
            .with_fps(10)
            .with_performance_window(50)
            .with_file_wait_timeout(file_wait_ms)
            .with_encoder(encoder);
        gif_config(out, 1, 1).with_strategy(CaptureStrategy::Video(video))
    }

    #[tokio::test]
    async fn test_recording_is_transcoded_and_placed() {
        let tools = TempDir::new().unwrap();
        let encoder = stub_encoder(tools.path());
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("exports");
        let mock = MockBrowser::new().with_flush_delay(Duration::from_millis(100));

        let summary = run(&mock, &catalog(&[("welcome", 1)]), &video_config(&out, &encoder, 3_000)).await;

        assert_eq!(summary.placed, 2, "{:?}", summary.units);
        assert_eq!(summary.strategy, "video");
        assert_eq!(
            files_under(&out),
            vec![
                PathBuf::from("welcome/welcome-cover.mp4"),
                PathBuf::from("welcome/welcome-frame-1.mp4"),
            ]
        );
        assert_eq!(&magic(&out.join("welcome/welcome-cover.mp4"))[4..8], b"ftyp");
        assert_eq!(mock.calls().recordings_flushed, 2);
        assert!(scratch_dirs(&out).is_empty());
    }

    #[tokio::test]
    async fn test_missing_recording_fails_after_bounded_wait() {
        let tools = TempDir::new().unwrap();
        let encoder = stub_encoder(tools.path());
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("exports");
        let mock = MockBrowser::new().dropping_recordings();

        let started = std::time::Instant::now();
        let summary = run(&mock, &catalog(&[("welcome", 0)]), &video_config(&out, &encoder, 200)).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(summary.failed, 1);
        assert!(summary.units[0]
            .error
            .as_deref()
            .unwrap()
            .contains("did not appear"));
        assert!(files_under(&out).is_empty());
        assert!(scratch_dirs(&out).is_empty());
    }

    #[tokio::test]
    async fn test_encoder_failure_is_unit_scoped() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("exports");
        let mock = MockBrowser::new();
        let config = video_config(&out, Path::new("/nonexistent/ffmpeg"), 2_000);

        let summary = run(&mock, &catalog(&[("welcome", 0), ("contact", 0)]), &config).await;

        assert_eq!(summary.failed, 2);
        assert!(summary.units[0]
            .error
            .as_deref()
            .unwrap()
            .contains("Transcode failed"));
        assert!(files_under(&out).is_empty());
        assert!(scratch_dirs(&out).is_empty());
    }

    #[tokio::test]
    async fn test_invalid_encode_leaves_previous_output_intact() {
        let tools = TempDir::new().unwrap();
        let encoder = tools.path().join("broken-ffmpeg.sh");
        std::fs::write(
            &encoder,
            "#!/bin/sh\nfor last; do :; done\nprintf 'garbage-not-mp4' > \"$last\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&encoder, std::fs::Permissions::from_mode(0o755)).unwrap();

        let dir = TempDir::new().unwrap();
        let out = dir.path().join("exports");
        let previous = out.join("welcome/welcome-cover.mp4");
        std::fs::create_dir_all(previous.parent().unwrap()).unwrap();
        let previous_bytes = b"\0\0\0\x18ftypisom previous run".to_vec();
        std::fs::write(&previous, &previous_bytes).unwrap();

        let mock = MockBrowser::new();
        let summary = run(&mock, &catalog(&[("welcome", 0)]), &video_config(&out, &encoder, 2_000)).await;

        assert_eq!(summary.failed, 1, "{:?}", summary.units);
        assert_eq!(std::fs::read(&previous).unwrap(), previous_bytes);
        assert!(scratch_dirs(&out).is_empty());
    }
}
