//! Unit tests for the playout-bypass library.

use std::{sync::Arc, time::Duration};

use crate::{
    controller::{PlaybackController, PlaybackState, SessionOptions},
    device::{Device, DeviceOutput, DisplayModeId, OutputFrame, PixelFormat},
    error::Error,
    frames::{FramePool, COLOUR_BARS},
    mock::MockDevice,
    scheduler::{FrameScheduler, TimingParams},
    watchdog::WatchdogConfig,
};

fn mock_output(device: &MockDevice) -> Arc<dyn DeviceOutput> {
    device.output().expect("mock output interface")
}

fn frame_bytes(pool: &FramePool, index: usize) -> Vec<u8> {
    let mut copy = Vec::new();
    pool.frame(index)
        .expect("frame index in range")
        .with_bytes(&mut |bytes| copy = bytes.to_vec())
        .expect("mock buffers always map");
    copy
}

fn ntsc_timing() -> TimingParams {
    TimingParams {
        frame_duration: 1001,
        time_scale: 30000,
        width: 720,
        height: 486,
    }
}

fn ntsc_scheduler(device: &MockDevice, ring: usize) -> FrameScheduler {
    let output = mock_output(device);
    let timing = ntsc_timing();
    let pool = FramePool::create(&output, ring, timing.width, timing.height, PixelFormat::Yuv8)
        .expect("mock allocation succeeds");
    FrameScheduler::new(pool, output, timing)
}

#[test]
fn test_fill_repeats_word_across_buffer() {
    let device = MockDevice::new();
    let pool = FramePool::create(&mock_output(&device), 1, 4, 2, PixelFormat::Yuv8).unwrap();

    pool.fill(0, 0xeb80_eb80).unwrap();

    let bytes = frame_bytes(&pool, 0);
    assert_eq!(bytes.len(), 4 * 2 * 2);
    for chunk in bytes.chunks_exact(4) {
        assert_eq!(chunk, 0xeb80_eb80u32.to_ne_bytes());
    }
}

#[test]
fn test_fill_is_idempotent() {
    let device = MockDevice::new();
    let pool = FramePool::create(&mock_output(&device), 1, 8, 4, PixelFormat::Yuv8).unwrap();

    pool.fill(0, COLOUR_BARS[3]).unwrap();
    let first = frame_bytes(&pool, 0);
    pool.fill(0, COLOUR_BARS[3]).unwrap();
    let second = frame_bytes(&pool, 0);

    assert_eq!(first, second);
}

#[test]
fn test_fill_rejects_odd_pixel_count() {
    // 3x1 pixels at 2 bytes per pixel is 6 bytes: not a whole number of
    // 32-bit words, so the final word write would spill past the buffer.
    let device = MockDevice::new();
    let pool = FramePool::create(&mock_output(&device), 1, 3, 1, PixelFormat::Yuv8).unwrap();

    match pool.fill(0, COLOUR_BARS[0]) {
        Err(Error::InvalidFormat(msg)) => assert!(msg.contains("6 bytes")),
        other => panic!("expected InvalidFormat, got {other:?}"),
    }
}

#[test]
fn test_fill_rejects_out_of_range_index() {
    let device = MockDevice::new();
    let pool = FramePool::create(&mock_output(&device), 2, 4, 2, PixelFormat::Yuv8).unwrap();

    match pool.fill(2, COLOUR_BARS[0]) {
        Err(Error::InvalidFrameIndex { index: 2, len: 2 }) => {}
        other => panic!("expected InvalidFrameIndex, got {other:?}"),
    }
}

#[test]
fn test_partial_allocation_failure_releases_created_frames() {
    let device = MockDevice::new();
    device.fail_frame_allocation_at(2);

    let result = FramePool::create(&mock_output(&device), 4, 720, 486, PixelFormat::Yuv8);

    match result {
        Err(Error::Allocation(msg)) => assert!(msg.contains("frame 3 of 4")),
        other => panic!("expected Allocation, got {other:?}"),
    }
    // The two frames created before the failure were released.
    assert_eq!(device.live_frames(), 0);
}

#[test]
fn test_release_is_idempotent() {
    let device = MockDevice::new();
    let mut pool = FramePool::create(&mock_output(&device), 3, 4, 2, PixelFormat::Yuv8).unwrap();
    assert_eq!(device.live_frames(), 3);

    pool.release();
    assert_eq!(device.live_frames(), 0);
    pool.release();
    assert!(pool.is_empty());
}

#[test]
fn test_colour_bars_assign_palette_in_ring_order() {
    let device = MockDevice::new();
    // Ten slots wrap the eight-entry palette.
    let pool = FramePool::create(&mock_output(&device), 10, 4, 2, PixelFormat::Yuv8).unwrap();
    pool.fill_colour_bars().unwrap();

    for i in 0..10 {
        let expected = COLOUR_BARS[i % COLOUR_BARS.len()].to_ne_bytes();
        assert_eq!(&frame_bytes(&pool, i)[..4], expected, "slot {i}");
    }
}

#[test]
fn test_ring_cursor_arithmetic() {
    let device = MockDevice::new();
    let mut scheduler = ntsc_scheduler(&device, 8);

    scheduler.preroll().unwrap();
    assert_eq!(scheduler.ring_state().total_scheduled(), 8);
    assert_eq!(scheduler.ring_state().next_index(), 0);

    for _ in 0..3 {
        scheduler.advance_one().unwrap();
    }
    assert_eq!(scheduler.ring_state().total_scheduled(), 11);
    assert_eq!(scheduler.ring_state().next_index(), 11 % 8);
}

#[test]
fn test_timestamps_are_increasing_multiples_of_frame_duration() {
    let device = MockDevice::new();
    let mut scheduler = ntsc_scheduler(&device, 4);

    scheduler.preroll().unwrap();
    scheduler.advance_one().unwrap();

    let submissions = device.submissions();
    assert_eq!(submissions.len(), 5);
    for (n, submission) in submissions.iter().enumerate() {
        assert_eq!(submission.display_time, n as i64 * 1001);
        assert_eq!(submission.duration, 1001);
        assert_eq!(submission.scale, 30000);
    }
}

#[test]
fn test_preroll_reports_failure_but_keeps_earlier_frames_queued() {
    let device = MockDevice::new();
    device.fail_submission_at(5);
    let mut scheduler = ntsc_scheduler(&device, 8);

    match scheduler.preroll() {
        Err(Error::Submission(_)) => {}
        other => panic!("expected Submission, got {other:?}"),
    }

    // All-or-nothing at the reported-result level only: the five frames
    // submitted before the failure remain queued in hardware.
    assert_eq!(scheduler.ring_state().total_scheduled(), 5);
    assert_eq!(device.submissions().len(), 5);
    assert_eq!(device.queued_frames(), 5);
}

#[test]
fn test_failed_advance_does_not_move_cursor() {
    let device = MockDevice::new();
    device.fail_submission_at(0);
    let mut scheduler = ntsc_scheduler(&device, 4);

    assert!(scheduler.advance_one().is_err());
    assert_eq!(scheduler.ring_state().total_scheduled(), 0);
    assert_eq!(scheduler.ring_state().next_index(), 0);

    // The next attempt schedules the same slot at the same timestamp.
    scheduler.advance_one().unwrap();
    assert_eq!(scheduler.ring_state().total_scheduled(), 1);
    assert_eq!(device.submissions()[0].display_time, 0);
}

#[test]
fn test_controller_requires_bypass_capability() {
    let device = MockDevice::without_bypass();
    let options = SessionOptions::builder(DisplayModeId::Ntsc).build().unwrap();

    match PlaybackController::new(&device, options) {
        Err(Error::CapabilityMissing(msg)) => assert!(msg.contains("bypass")),
        other => panic!("expected CapabilityMissing, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_configure_fails_for_missing_mode() {
    let device = MockDevice::new();
    let options = SessionOptions::builder(DisplayModeId::Hd1080i5994)
        .build()
        .unwrap();
    let mut controller = PlaybackController::new(&device, options).unwrap();

    match controller.configure() {
        Err(Error::ModeNotFound(DisplayModeId::Hd1080i5994)) => {}
        other => panic!("expected ModeNotFound, got {other:?}"),
    }

    // Rolled back: no output enabled, no timing derived.
    assert_eq!(controller.state(), PlaybackState::Idle);
    assert!(controller.timing().is_none());
    assert!(!device.output_enabled());
}

#[test]
fn test_configure_derives_timing_from_mode() {
    let device = MockDevice::new();
    let options = SessionOptions::builder(DisplayModeId::Ntsc).build().unwrap();
    let mut controller = PlaybackController::new(&device, options).unwrap();

    controller.configure().unwrap();

    assert_eq!(controller.state(), PlaybackState::Configuring);
    assert!(device.output_enabled());
    let timing = controller.timing().unwrap();
    assert_eq!(timing.frame_duration, 1001);
    assert_eq!(timing.time_scale, 30000);
    assert_eq!((timing.width, timing.height), (720, 486));
}

#[test]
fn test_allocation_failure_unwinds_to_idle() {
    let device = MockDevice::new();
    device.fail_frame_allocation_at(5);
    let options = SessionOptions::builder(DisplayModeId::Ntsc).build().unwrap();
    let mut controller = PlaybackController::new(&device, options).unwrap();

    match controller.setup() {
        Err(Error::Allocation(_)) => {}
        other => panic!("expected Allocation, got {other:?}"),
    }

    assert_eq!(controller.state(), PlaybackState::Idle);
    assert!(!device.output_enabled());
    assert_eq!(device.live_frames(), 0);
}

#[test]
fn test_preroll_failure_aborts_start() {
    let device = MockDevice::new();
    device.fail_submission_at(3);
    let options = SessionOptions::builder(DisplayModeId::Ntsc).build().unwrap();
    let mut controller = PlaybackController::new(&device, options).unwrap();
    controller.setup().unwrap();

    match controller.start() {
        Err(Error::Submission(_)) => {}
        other => panic!("expected Submission, got {other:?}"),
    }

    assert_eq!(controller.state(), PlaybackState::Idle);
    assert!(!device.clock_running());
    assert!(!device.output_enabled());
    assert_eq!(device.live_frames(), 0);
}

#[test]
fn test_stop_before_start_is_a_noop() {
    let device = MockDevice::new();
    let options = SessionOptions::builder(DisplayModeId::Ntsc).build().unwrap();
    let mut controller = PlaybackController::new(&device, options).unwrap();

    controller.stop();
    assert_eq!(controller.state(), PlaybackState::Idle);

    // Still usable: the no-op stop did not consume the session.
    controller.setup().unwrap();
    assert_eq!(controller.state(), PlaybackState::Prerolled);
}

#[test]
fn test_stopped_is_terminal() {
    let device = MockDevice::new();
    let options = SessionOptions::builder(DisplayModeId::Ntsc).build().unwrap();
    let mut controller = PlaybackController::new(&device, options).unwrap();
    controller.setup().unwrap();
    controller.start().unwrap();

    controller.stop();
    assert_eq!(controller.state(), PlaybackState::Stopped);
    controller.stop(); // repeated stop is a no-op
    assert_eq!(controller.state(), PlaybackState::Stopped);

    match controller.configure() {
        Err(Error::InvalidTransition {
            operation: "configure",
            state: PlaybackState::Stopped,
        }) => {}
        other => panic!("expected InvalidTransition, got {other:?}"),
    }
}

#[test]
fn test_start_requires_preroll_state() {
    let device = MockDevice::new();
    let options = SessionOptions::builder(DisplayModeId::Ntsc).build().unwrap();
    let mut controller = PlaybackController::new(&device, options).unwrap();

    match controller.start() {
        Err(Error::InvalidTransition {
            operation: "start",
            state: PlaybackState::Idle,
        }) => {}
        other => panic!("expected InvalidTransition, got {other:?}"),
    }
}

#[test]
fn test_session_options_reject_empty_ring() {
    match SessionOptions::builder(DisplayModeId::Ntsc).ring_frames(0).build() {
        Err(Error::InvalidConfiguration(msg)) => assert!(msg.contains("at least one")),
        other => panic!("expected InvalidConfiguration, got {other:?}"),
    }
}

#[test]
fn test_session_options_defaults() {
    let options = SessionOptions::builder(DisplayModeId::Pal).build().unwrap();
    assert_eq!(options.ring_frames, 8);
    assert_eq!(options.pixel_format, PixelFormat::Yuv8);
    assert_eq!(options.watchdog, WatchdogConfig::default());
}

#[test]
fn test_watchdog_config_rejects_margin_at_or_above_timeout() {
    let timeout = Duration::from_millis(40);

    assert!(WatchdogConfig::new(timeout, Duration::from_millis(40)).is_err());
    assert!(WatchdogConfig::new(timeout, Duration::from_millis(50)).is_err());
    assert!(WatchdogConfig::new(Duration::ZERO, Duration::ZERO).is_err());

    let config = WatchdogConfig::new(timeout, Duration::from_millis(10)).unwrap();
    assert_eq!(config.refresh_interval(), Duration::from_millis(30));
}

#[test]
fn test_pixel_format_strides() {
    assert_eq!(PixelFormat::Yuv8.row_bytes(720), 1440);
    assert_eq!(PixelFormat::Bgra8.row_bytes(720), 2880);
    assert_eq!(PixelFormat::Argb8.bytes_per_pixel(), 4);
}
