use super::*;
use proptest::prelude::*;
use std::sync::Arc;

/// `rows` source rows starting at global line `first`; byte x of line n is `(n + x) mod 256`
fn pattern(first: usize, rows: usize, stride: usize) -> Vec<u8> {
    let mut data = vec![0u8; rows * stride];
    for (r, row) in data.chunks_mut(stride).enumerate() {
        for (x, byte) in row.iter_mut().enumerate() {
            *byte = ((first + r + x) % 256) as u8;
        }
    }
    data
}

/// Expected stored row for global line `line` under a byte ROI starting at `roi_x`
fn roi_row(line: usize, roi_x: usize, row_bytes: usize) -> Vec<u8> {
    (0..row_bytes).map(|x| ((line + roi_x + x) % 256) as u8).collect()
}

fn scenario_store() -> LineStore {
    LineStore::new(LineStoreConfig::new(100, 10, 50, 20, 5, PixelType::U8)).unwrap()
}

fn warmup_rows(store: &LineStore) -> Vec<Vec<u8>> {
    let stored = store.stored_lines();
    let window = store.try_get_window(0, store.width(), stored, 0).unwrap().unwrap();
    window.rows().map(|r| r.to_vec()).collect()
}

#[test]
fn test_introspection() {
    let store = LineStore::new(LineStoreConfig::new(100, 10, 50, 20, 5, PixelType::U16)).unwrap();
    assert_eq!(store.source_width(), 100);
    assert_eq!(store.roi_x(), 10);
    assert_eq!(store.width(), 50);
    assert_eq!(store.capacity_lines(), 20);
    assert_eq!(store.warmup_lines(), 5);
    assert_eq!(store.pixel_type(), PixelType::U16);
    assert_eq!(store.elem_size(), 2);
    assert_eq!(store.row_bytes(), 100);
    assert_eq!(store.source_row_bytes(), 200);
    assert_eq!(store.stored_lines(), 0);
    assert_eq!(store.head_total(), 0);
    assert!(!store.is_committed());
}

#[test]
fn test_construction_rejects_bad_geometry() {
    let err = LineStore::new(LineStoreConfig::new(100, 60, 50, 20, 5, PixelType::U8)).unwrap_err();
    assert!(matches!(err, LineStoreError::OutOfRange { field: "roi_width", .. }));

    let err = LineStore::new(LineStoreConfig::new(100, 0, 50, 4, 5, PixelType::U8)).unwrap_err();
    assert!(matches!(err, LineStoreError::OutOfRange { field: "warmup_lines", .. }));
}

#[test]
fn test_warmup_single_rows_slide() {
    let mut store = scenario_store();
    for line in 0..8 {
        let status = store.push_block_at(&pattern(line, 1, 100), 1, 100, line as f64).unwrap();
        assert_eq!(status, PushStatus::Stored { rows: 1 });
        assert_eq!(store.stored_lines(), (line + 1).min(5));
    }

    let rows = warmup_rows(&store);
    let expected: Vec<Vec<u8>> = (3..8).map(|line| roi_row(line, 10, 50)).collect();
    assert_eq!(rows, expected);
    for row in 0..5 {
        assert_eq!(store.row_time(row).unwrap(), Some((row + 3) as f64));
    }
    assert_eq!(store.head_total(), 8);
}

#[test]
fn test_warmup_bulk_block_keeps_freshest() {
    let mut store = scenario_store();
    store.push_block_at(&pattern(0, 8, 100), 8, 100, 5.0).unwrap();

    assert_eq!(store.stored_lines(), 5);
    let expected: Vec<Vec<u8>> = (3..8).map(|line| roi_row(line, 10, 50)).collect();
    assert_eq!(warmup_rows(&store), expected);
    for row in 0..5 {
        assert_eq!(store.row_time(row).unwrap(), Some(5.0));
    }
}

#[test]
fn test_warmup_partial_fill_then_wrap() {
    let mut store = scenario_store();
    store.push_block_at(&pattern(0, 3, 100), 3, 100, 1.0).unwrap();
    store.push_block_at(&pattern(3, 9, 100), 9, 100, 2.0).unwrap();

    let expected: Vec<Vec<u8>> = (7..12).map(|line| roi_row(line, 10, 50)).collect();
    assert_eq!(warmup_rows(&store), expected);
    assert_eq!(store.head_total(), 12);
}

#[test]
fn test_warmup_partial_fill_then_slide() {
    let mut store = scenario_store();
    store.push_block_at(&pattern(0, 3, 100), 3, 100, 1.0).unwrap();
    store.push_block_at(&pattern(3, 4, 100), 4, 100, 2.0).unwrap();

    let expected: Vec<Vec<u8>> = (2..7).map(|line| roi_row(line, 10, 50)).collect();
    assert_eq!(warmup_rows(&store), expected);
    assert_eq!(store.row_time(0).unwrap(), Some(1.0));
    assert_eq!(store.row_time(1).unwrap(), Some(2.0));
    assert_eq!(store.row_time(4).unwrap(), Some(2.0));
}

#[test]
fn test_pre_commit_window_is_snapshot() {
    let mut store = scenario_store();
    store.push_block_at(&pattern(0, 5, 100), 5, 100, 0.0).unwrap();
    let window = store.try_get_latest_window(20, 2, 0).unwrap().unwrap();
    assert!(!window.is_zero_copy());
    assert_eq!(window.start_row(), 3);
    assert_eq!(window.stride_bytes(), 50);
    assert_eq!(window.as_bytes().len(), 50 + 20);
    assert_eq!(window.row(1).unwrap(), &roi_row(4, 10, 50)[..20]);
}

#[test]
fn test_commit_is_idempotent() {
    let clock = Arc::new(ManualClock::new(100.0));
    let mut store = LineStore::with_clock(LineStoreConfig::new(100, 10, 50, 20, 5, PixelType::U8), clock.clone()).unwrap();
    store.push_block_at(&pattern(0, 3, 100), 3, 100, 4.0).unwrap();

    store.commit().unwrap();
    let once = (store.stats(), store.time_anchors().unwrap());
    clock.advance(10.0);
    store.commit().unwrap();
    let twice = (store.stats(), store.time_anchors().unwrap());

    assert_eq!(once, twice);
    assert!(store.is_committed());
    assert_eq!(store.stored_lines(), 3);
    assert_eq!(once.1, vec![Anchor { start_logical: 0, time_sec: 4.0 }]);
}

#[test]
fn test_commit_without_rows() {
    let clock = Arc::new(ManualClock::new(50.0));
    let mut store = LineStore::with_clock(LineStoreConfig::new(100, 10, 50, 20, 5, PixelType::U8), clock).unwrap();
    store.commit().unwrap();

    assert!(store.is_committed());
    assert_eq!(store.stored_lines(), 0);
    assert_eq!(store.time_anchors().unwrap(), vec![Anchor { start_logical: 0, time_sec: 50.0 }]);
    assert!(store.try_get_latest_window(50, 1, 0).unwrap().is_none());

    store.push_block_at(&pattern(0, 2, 100), 2, 100, 51.0).unwrap();
    store.push_block_at(&pattern(2, 2, 100), 2, 100, 52.0).unwrap();
    assert_eq!(store.stored_lines(), 2 + 2);
    assert_eq!(store.row_time(0).unwrap(), Some(51.0));
    assert_eq!(store.row_time(1).unwrap(), Some(51.5));
    assert_eq!(store.row_time(3).unwrap(), Some(52.5));

    let window = store.try_get_window(0, 50, 4, 0).unwrap().unwrap();
    let expected: Vec<Vec<u8>> = (0..4).map(|line| roi_row(line, 10, 50)).collect();
    assert_eq!(window.rows().map(|r| r.to_vec()).collect::<Vec<_>>(), expected);
}

#[test]
fn test_scenario_latest_window_time() {
    let mut store = scenario_store();
    store.push_block_at(&pattern(0, 5, 100), 5, 100, 0.0).unwrap();
    assert_eq!(store.stored_lines(), 5);
    store.commit().unwrap();

    for i in 1..=10 {
        let status = store.push_block_at(&pattern(4 + i, 1, 100), 1, 100, i as f64).unwrap();
        assert!(status.is_complete());
    }
    assert_eq!(store.stored_lines(), 15);
    assert_eq!(store.head_total(), 15);

    let window = store.try_get_latest_window(20, 5, 0).unwrap().unwrap();
    assert!(window.is_zero_copy());
    assert_eq!(window.stride_bytes(), 50);
    assert_eq!(window.start_row(), 10);
    assert_eq!(window.top_time_sec(), 6.0);
    assert_eq!(store.row_time(10).unwrap(), Some(6.0));
    assert_eq!(window.row(0).unwrap(), &roi_row(10, 10, 50)[..20]);

    // one anchor per linear push, strictly increasing
    let anchors = store.time_anchors().unwrap();
    assert_eq!(anchors.len(), 10);
    assert!(anchors.windows(2).all(|w| w[0].start_logical < w[1].start_logical));
    assert_eq!(anchors[0], Anchor { start_logical: 0, time_sec: 1.0 });
}

#[test]
fn test_fill_exactly_then_full() {
    let mut store = scenario_store();
    store.push_block_at(&pattern(0, 5, 100), 5, 100, 0.0).unwrap();
    store.commit().unwrap();

    let remain = store.capacity_lines() - store.stored_lines();
    let status = store.push_block_at(&pattern(5, remain, 100), remain, 100, 1.0).unwrap();
    assert_eq!(status, PushStatus::Stored { rows: remain });
    assert_eq!(store.stored_lines(), store.capacity_lines());

    let before = store.try_get_window(0, 50, 20, 0).unwrap().unwrap().to_packed();
    let stats = store.stats();
    let status = store.push_block_at(&pattern(99, 1, 100), 1, 100, 2.0).unwrap();
    assert_eq!(status, PushStatus::Full);
    assert!(!status.is_complete());
    assert_eq!(store.stats(), stats);
    assert_eq!(store.try_get_window(0, 50, 20, 0).unwrap().unwrap().to_packed(), before);
}

#[test]
fn test_partial_write_reports_truncation() {
    let mut store = scenario_store();
    store.push_block_at(&pattern(0, 5, 100), 5, 100, 0.0).unwrap();
    store.commit().unwrap();
    store.push_block_at(&pattern(5, 12, 100), 12, 100, 1.0).unwrap();

    let status = store.push_block_at(&pattern(17, 5, 100), 5, 100, 2.0).unwrap();
    assert_eq!(status, PushStatus::Truncated { written: 3, dropped: 2 });
    assert_eq!(status.rows_written(), 3);
    assert_eq!(store.stored_lines(), 20);
    assert_eq!(store.head_total(), 20);

    let window = store.try_get_latest_window(50, 3, 0).unwrap().unwrap();
    let expected: Vec<Vec<u8>> = (17..20).map(|line| roi_row(line, 10, 50)).collect();
    assert_eq!(window.rows().map(|r| r.to_vec()).collect::<Vec<_>>(), expected);
}

#[test]
fn test_round_trip_u16_with_padded_stride() {
    let config = LineStoreConfig::new(32, 0, 32, 16, 2, PixelType::U16);
    let mut store = LineStore::new(config).unwrap();
    store.commit().unwrap();

    // 64 payload bytes per row, 16 bytes of padding
    let src = pattern(0, 3, 80);
    store.push_block_at(&src, 3, 80, 1.0).unwrap();

    for row in 0..3 {
        let window = store.try_get_window(row, 32, 1, 0).unwrap().unwrap();
        assert_eq!(window.row(0).unwrap(), &src[row * 80..row * 80 + 64]);
    }
}

#[test]
fn test_contiguous_fast_path() {
    let config = LineStoreConfig::full_width(16, 8, 1);
    let mut store = LineStore::new(config).unwrap();
    store.commit().unwrap();
    let src = pattern(0, 4, 16);
    store.push_block_at(&src, 4, 16, 1.0).unwrap();

    let window = store.try_get_window(0, 16, 4, 0).unwrap().unwrap();
    assert_eq!(window.as_bytes(), &src[..]);
}

#[test]
fn test_window_clamps_offset() {
    let mut store = scenario_store();
    store.push_block_at(&pattern(0, 5, 100), 5, 100, 0.0).unwrap();
    store.commit().unwrap();

    let window = store.try_get_window(1, 20, 2, 1000).unwrap().unwrap();
    assert_eq!(window.x_offset(), 30);
    assert_eq!(window.row(0).unwrap(), &roi_row(1, 10, 50)[30..50]);
    assert!(window.row(2).is_none());

    let window = store.try_get_window(1, 20, 2, 7).unwrap().unwrap();
    assert_eq!(window.x_offset(), 7);
    assert_eq!(window.row(1).unwrap(), &roi_row(2, 10, 50)[7..27]);
}

#[test]
fn test_window_geometry_failures() {
    let mut store = scenario_store();
    assert!(store.try_get_latest_window(10, 1, 0).unwrap().is_none());

    store.push_block_at(&pattern(0, 5, 100), 5, 100, 0.0).unwrap();
    store.commit().unwrap();
    assert!(store.try_get_window(0, 51, 1, 0).unwrap().is_none());
    assert!(store.try_get_window(0, 0, 1, 0).unwrap().is_none());
    assert!(store.try_get_window(0, 10, 0, 0).unwrap().is_none());
    assert!(store.try_get_window(3, 10, 3, 0).unwrap().is_none());
    assert!(store.try_get_window(usize::MAX, 10, 2, 0).unwrap().is_none());
    assert!(store.try_get_window(0, 10, usize::MAX, 0).unwrap().is_none());
    assert!(store.try_get_latest_window(10, 6, 0).unwrap().is_none());
    assert!(store.try_get_latest_window(10, 5, 0).unwrap().is_some());
    assert_eq!(store.row_time(5).unwrap(), None);
}

#[test]
fn test_invalid_arguments_do_not_mutate() {
    let mut store = scenario_store();

    assert_eq!(store.push_block_at(&[], 0, 0, 0.0).unwrap(), PushStatus::Stored { rows: 0 });

    let err = store.push_block_at(&pattern(0, 2, 100), 2, 99, 0.0).unwrap_err();
    assert!(matches!(err, LineStoreError::InvalidArgument(_)));

    let short = pattern(0, 2, 100);
    let err = store.push_block_at(&short[..199], 2, 100, 0.0).unwrap_err();
    assert!(matches!(err, LineStoreError::InvalidArgument(_)));

    let err = store.push_block_at(&short, usize::MAX, 100, 0.0).unwrap_err();
    assert!(matches!(err, LineStoreError::InvalidArgument(_)));

    assert_eq!(store.stored_lines(), 0);
    assert_eq!(store.head_total(), 0);

    store.push_block_at(&short[..190], 2, 100, 0.0).unwrap_err();
    // the last row only needs a full source row, not a full stride
    store.push_block_at(&pattern(0, 2, 120)[..220], 2, 120, 0.0).unwrap();
    assert_eq!(store.stored_lines(), 2);
}

#[test]
fn test_untimed_push_uses_clock() {
    let clock = Arc::new(ManualClock::new(1000.0));
    let mut store = LineStore::with_clock(LineStoreConfig::new(100, 10, 50, 20, 5, PixelType::U8), clock.clone()).unwrap();
    store.push_block(&pattern(0, 1, 100), 1, 100).unwrap();
    clock.advance(1.0);
    store.commit().unwrap();
    store.push_block(&pattern(1, 1, 100), 1, 100).unwrap();

    assert_eq!(store.row_time(0).unwrap(), Some(1000.0));
    assert_eq!(store.row_time(1).unwrap(), Some(1001.0));
}

#[test]
fn test_utc_timestamps() {
    use chrono::TimeZone;

    let mut store = scenario_store();
    let t = chrono::Utc.timestamp_opt(1_700_000_000, 500_000_000).unwrap();
    store.push_block_at_utc(&pattern(0, 1, 100), 1, 100, t).unwrap();
    let stamped = store.row_time(0).unwrap().unwrap();
    assert!((stamped - 1_700_000_000.5).abs() < 1e-6);
}

#[test]
fn test_frozen_warmup_keeps_row_stamps() {
    let mut store = scenario_store();
    for line in 0..5 {
        store.push_block_at(&pattern(line, 1, 100), 1, 100, line as f64).unwrap();
    }
    store.commit().unwrap();
    store.push_block_at(&pattern(5, 2, 100), 2, 100, 10.0).unwrap();

    assert_eq!(store.row_time(2).unwrap(), Some(2.0));
    assert_eq!(store.row_time(4).unwrap(), Some(4.0));
    assert_eq!(store.row_time(5).unwrap(), Some(10.0));

    let window = store.try_get_window(3, 50, 3, 0).unwrap().unwrap();
    assert!(window.is_zero_copy());
    assert_eq!(window.top_time_sec(), 3.0);
    let expected: Vec<Vec<u8>> = (3..6).map(|line| roi_row(line, 10, 50)).collect();
    assert_eq!(window.rows().map(|r| r.to_vec()).collect::<Vec<_>>(), expected);
}

#[test]
fn test_dispose_is_idempotent_and_terminal() {
    let mut store = scenario_store();
    let reader = store.reader();
    store.push_block_at(&pattern(0, 5, 100), 5, 100, 0.0).unwrap();

    store.dispose();
    store.dispose();
    reader.dispose();
    assert!(store.is_disposed());
    assert_eq!(reader.lifecycle_state(), LifecycleState::Disposed);

    assert_eq!(store.push_block_at(&pattern(0, 1, 100), 1, 100, 0.0), Err(LineStoreError::Disposed));
    assert_eq!(store.commit(), Err(LineStoreError::Disposed));
    assert_eq!(store.row_time(0), Err(LineStoreError::Disposed));
    assert!(matches!(reader.try_get_latest_window(10, 1, 0), Err(LineStoreError::Disposed)));
    assert!(matches!(reader.try_get_window(0, 10, 1, 0), Err(LineStoreError::Disposed)));
    assert_eq!(reader.time_anchors(), Err(LineStoreError::Disposed));
}

#[test]
fn test_drop_disposes_for_readers() {
    let store = scenario_store();
    let reader = store.reader();
    drop(store);
    assert!(reader.is_disposed());
    assert!(matches!(reader.try_get_latest_window(10, 1, 0), Err(LineStoreError::Disposed)));
}

#[test]
fn test_live_window_defers_release() {
    let mut store = scenario_store();
    store.push_block_at(&pattern(0, 5, 100), 5, 100, 0.0).unwrap();
    store.commit().unwrap();
    let reader = store.reader();

    let window = reader.try_get_latest_window(50, 2, 0).unwrap().unwrap();
    store.dispose();
    assert_eq!(reader.lifecycle_state(), LifecycleState::Disposing);
    assert_eq!(window.row(1).unwrap(), &roi_row(4, 10, 50)[..]);

    drop(window);
    assert_eq!(reader.lifecycle_state(), LifecycleState::Disposed);
}

#[test]
fn test_dispose_from_other_thread() {
    let store = scenario_store();
    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| store.dispose());
        }
    });
    assert!(store.is_disposed());
}

#[test]
fn test_stats_snapshot() {
    let mut store = scenario_store();
    store.push_block_at(&pattern(0, 7, 100), 7, 100, 0.0).unwrap();
    store.commit().unwrap();
    store.push_block_at(&pattern(7, 5, 100), 5, 100, 1.0).unwrap();

    let stats = store.stats();
    assert_eq!(stats.stored_lines, 10);
    assert_eq!(stats.head_total, 12);
    assert_eq!(stats.anchors, 1);
    assert!(stats.committed);
    assert!((stats.fill_ratio - 0.5).abs() < 1e-12);
}

/// Reference model of the warmup window: the last `capacity` lines pushed
fn expected_warmup(blocks: &[usize], capacity: usize) -> (Vec<usize>, Vec<f64>) {
    let mut lines = Vec::new();
    let mut times = Vec::new();
    let mut next = 0;
    for (i, &rows) in blocks.iter().enumerate() {
        for _ in 0..rows {
            lines.push(next);
            times.push(i as f64);
            next += 1;
        }
    }
    let skip = lines.len().saturating_sub(capacity);
    (lines[skip..].to_vec(), times[skip..].to_vec())
}

proptest! {
    #[test]
    fn prop_warmup_holds_most_recent_rows(
        capacity in 1usize..8,
        blocks in prop::collection::vec(0usize..12, 1..10),
    ) {
        let config = LineStoreConfig::new(6, 2, 3, 64, capacity, PixelType::U8);
        let mut store = LineStore::new(config).unwrap();
        let mut first = 0;
        for (i, &rows) in blocks.iter().enumerate() {
            store.push_block_at(&pattern(first, rows, 6), rows, 6, i as f64).unwrap();
            first += rows;
            prop_assert!(store.stored_lines() <= store.capacity_lines());
        }

        let (lines, times) = expected_warmup(&blocks, capacity);
        prop_assert_eq!(store.stored_lines(), lines.len());
        if !lines.is_empty() {
            let expected: Vec<Vec<u8>> = lines.iter().map(|&l| roi_row(l, 2, 3)).collect();
            prop_assert_eq!(warmup_rows(&store), expected);
            for (row, &t) in times.iter().enumerate() {
                prop_assert_eq!(store.row_time(row).unwrap(), Some(t));
            }
        }
    }

    #[test]
    fn prop_row_time_non_decreasing(
        warmup_blocks in prop::collection::vec(1usize..4, 0..4),
        linear_blocks in prop::collection::vec((1usize..6, 0.0f64..2.0), 0..12),
    ) {
        let config = LineStoreConfig::new(4, 0, 4, 40, 6, PixelType::U8);
        let mut store = LineStore::with_clock(config, Arc::new(ManualClock::new(0.0))).unwrap();

        let mut t = 0.0;
        for &rows in &warmup_blocks {
            t += 0.5;
            store.push_block_at(&pattern(0, rows, 4), rows, 4, t).unwrap();
        }
        store.commit().unwrap();
        for &(rows, dt) in &linear_blocks {
            t += dt;
            store.push_block_at(&pattern(0, rows, 4), rows, 4, t).unwrap();
            prop_assert!(store.stored_lines() <= store.capacity_lines());
        }

        let times: Vec<f64> = (0..store.stored_lines())
            .map(|row| store.row_time(row).unwrap().unwrap())
            .collect();
        for pair in times.windows(2) {
            prop_assert!(pair[0] <= pair[1] + 1e-9, "times not monotonic: {:?}", times);
        }
    }
}
