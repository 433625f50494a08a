use std::time::{Duration, Instant};

use approx::assert_abs_diff_eq;
use house_viewer::diagnostics::Diagnostics;

#[test]
fn should_sample_once_per_second() {
    let mut diagnostics = Diagnostics::new();
    let start = Instant::now();

    assert_eq!(diagnostics.update_at(start), None);
    for frame in 1..60 {
        let now = start + Duration::from_millis(frame * 16);
        assert_eq!(diagnostics.update_at(now), None);
    }
    let stats = diagnostics
        .update_at(start + Duration::from_secs(1))
        .expect("one second elapsed");

    assert_abs_diff_eq!(stats.fps, 60.0, epsilon = 1e-3);
    assert_abs_diff_eq!(stats.frame_ms, 1000.0 / 60.0, epsilon = 1e-3);
    assert_eq!(diagnostics.latest(), Some(stats));
    assert_eq!(diagnostics.total_frames(), 61);
}

#[test]
fn should_format_sample_for_window_title() {
    let mut diagnostics = Diagnostics::new();
    let start = Instant::now();
    diagnostics.update_at(start);
    diagnostics.update_at(start + Duration::from_millis(500));

    let stats = diagnostics
        .update_at(start + Duration::from_secs(1))
        .unwrap();

    assert_eq!(stats.to_string(), "2 FPS (500.0 ms)");
}
