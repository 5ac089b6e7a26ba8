/// Advisory progress counters shared by every scan task, plus the throttle
/// that decides when a folder completion becomes a progress message.
///
/// Counters use relaxed atomics. Races only skew the estimate; final totals
/// are always taken from the reduced tree.
use super::progress::{ScanMessage, ScanProgress};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Emit on every Nth processed folder.
pub const PROGRESS_EVERY_N_FOLDERS: u64 = 10;
/// Emit when this long has passed since the last message.
pub const PROGRESS_INTERVAL_MS: u64 = 1_000;
/// Folders at this depth or shallower always emit.
pub const ALWAYS_REPORT_DEPTH: u32 = 2;
/// Ceiling while the walk is still running.
pub const MAX_RUNNING_PERCENTAGE: f64 = 95.0;
/// ETA is withheld below this percentage.
pub const ETA_MIN_PERCENTAGE: f64 = 5.0;

pub struct ProgressTracker {
    started: Instant,
    processed_size: AtomicU64,
    processed_folders: AtomicU64,
    discovered_folders: AtomicU64,
    last_emit_ms: AtomicU64,
    tx: Sender<ScanMessage>,
}

impl ProgressTracker {
    pub fn new(tx: Sender<ScanMessage>) -> Self {
        Self {
            started: Instant::now(),
            processed_size: AtomicU64::new(0),
            processed_folders: AtomicU64::new(0),
            discovered_folders: AtomicU64::new(0),
            last_emit_ms: AtomicU64::new(0),
            tx,
        }
    }

    #[inline]
    pub fn add_bytes(&self, bytes: u64) {
        self.processed_size.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn folder_discovered(&self) {
        self.discovered_folders.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a fully processed folder and emit progress if the throttle allows.
    pub fn folder_done(&self, path: &str, depth: u32) {
        let processed = self.processed_folders.fetch_add(1, Ordering::Relaxed) + 1;
        let now_ms = self.elapsed_ms();
        let last = self.last_emit_ms.load(Ordering::Relaxed);

        if should_emit(processed, now_ms.saturating_sub(last), depth) {
            self.last_emit_ms.store(now_ms, Ordering::Relaxed);
            // A dropped receiver means the scan was abandoned; nothing to do.
            let _ = self.tx.send(ScanMessage::Progress(self.progress(path, now_ms)));
        }
    }

    fn progress(&self, path: &str, elapsed_ms: u64) -> ScanProgress {
        let processed_size = self.processed_size.load(Ordering::Relaxed);
        let processed_folders = self.processed_folders.load(Ordering::Relaxed);
        let discovered = self.discovered_folders.load(Ordering::Relaxed);
        let estimate = estimate(elapsed_ms, processed_size, processed_folders, discovered);

        ScanProgress {
            current_path: path.to_string(),
            processed_size,
            percentage: estimate.percentage,
            processed_folders,
            speed: estimate.speed,
            estimated_time_remaining: estimate.remaining_ms,
        }
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Throttle rule for one completed folder.
pub fn should_emit(processed_folders: u64, ms_since_last: u64, depth: u32) -> bool {
    processed_folders % PROGRESS_EVERY_N_FOLDERS == 0
        || ms_since_last >= PROGRESS_INTERVAL_MS
        || depth <= ALWAYS_REPORT_DEPTH
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub percentage: f64,
    pub speed: Option<f64>,
    pub remaining_ms: Option<u64>,
}

/// Percentage, throughput and ETA from the running counters.
///
/// `discovered` grows during the walk, so the percentage is a heuristic.
pub fn estimate(elapsed_ms: u64, processed_size: u64, processed: u64, discovered: u64) -> Estimate {
    let percentage = if discovered > 0 {
        (processed as f64 / discovered as f64 * 100.0).min(MAX_RUNNING_PERCENTAGE)
    } else {
        0.0
    };

    let speed = (elapsed_ms > 0).then(|| processed_size as f64 / (elapsed_ms as f64 / 1_000.0));

    let remaining_ms = match speed {
        Some(speed) if percentage > ETA_MIN_PERCENTAGE && speed > 0.0 => {
            let total = elapsed_ms as f64 / percentage * 100.0;
            Some((total - elapsed_ms as f64).max(0.0) as u64)
        }
        _ => None,
    };

    Estimate {
        percentage,
        speed,
        remaining_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_rules() {
        // Shallow folders always report.
        assert!(should_emit(3, 0, 0));
        assert!(should_emit(3, 0, 2));
        // Deep folders report on every 10th or after a quiet second.
        assert!(!should_emit(3, 10, 3));
        assert!(should_emit(20, 10, 7));
        assert!(should_emit(21, 1_000, 7));
        assert!(!should_emit(21, 999, 7));
    }

    #[test]
    fn percentage_is_capped_while_running() {
        let e = estimate(1_000, 0, 50, 40);
        assert_eq!(e.percentage, MAX_RUNNING_PERCENTAGE);
        let e = estimate(1_000, 0, 5, 0);
        assert_eq!(e.percentage, 0.0);
    }

    #[test]
    fn eta_only_after_five_percent() {
        let early = estimate(2_000, 1_000, 1, 100);
        assert!(early.remaining_ms.is_none());

        // 25% after 2s -> 8s total -> 6s remaining.
        let later = estimate(2_000, 4_000, 25, 100);
        assert_eq!(later.percentage, 25.0);
        assert_eq!(later.speed, Some(2_000.0));
        assert_eq!(later.remaining_ms, Some(6_000));
    }

    #[test]
    fn no_speed_at_time_zero() {
        let e = estimate(0, 500, 10, 20);
        assert!(e.speed.is_none());
        assert!(e.remaining_ms.is_none());
    }

    #[test]
    fn folder_done_sends_for_shallow_folders() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let tracker = ProgressTracker::new(tx);
        tracker.folder_discovered();
        tracker.folder_discovered();
        tracker.add_bytes(512);
        tracker.folder_done("/scan/a", 1);

        match rx.try_recv() {
            Ok(ScanMessage::Progress(p)) => {
                assert_eq!(p.current_path, "/scan/a");
                assert_eq!(p.processed_size, 512);
                assert_eq!(p.processed_folders, 1);
                assert_eq!(p.percentage, 50.0);
            }
            other => panic!("expected progress, got {other:?}"),
        }
    }

    #[test]
    fn folder_done_throttles_deep_folders() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let tracker = ProgressTracker::new(tx);
        for i in 0..9 {
            tracker.folder_done(&format!("/deep/{i}"), 5);
        }
        // None of the first nine deep folders hit the every-10th rule, and
        // the test runs well inside the one-second window.
        assert!(rx.try_recv().is_err());
        tracker.folder_done("/deep/9", 5);
        assert!(matches!(rx.try_recv(), Ok(ScanMessage::Progress(_))));
    }
}
