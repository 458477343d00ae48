use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use tokio::{task::JoinHandle, time::interval};

pub static METER: Meter = Meter::new();

/// Frame counters of the capture loop.
#[derive(Default)]
pub struct Meter {
    captured_frames: AtomicU64,
    reacted_frames: AtomicU64,
    skipped_frames: AtomicU64,
}

impl Meter {
    pub const fn new() -> Meter {
        Meter {
            captured_frames: AtomicU64::new(0),
            reacted_frames: AtomicU64::new(0),
            skipped_frames: AtomicU64::new(0),
        }
    }

    pub fn tick_captured(&self) {
        self.captured_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_reacted(&self) {
        self.reacted_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_skipped(&self) {
        self.skipped_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_reset_captured(&self) -> u64 {
        self.captured_frames.swap(0, Ordering::Relaxed)
    }

    pub fn get_reset_reacted(&self) -> u64 {
        self.reacted_frames.swap(0, Ordering::Relaxed)
    }

    pub fn get_reset_skipped(&self) -> u64 {
        self.skipped_frames.swap(0, Ordering::Relaxed)
    }
}

pub fn spawn_meter_logger() -> JoinHandle<()> {
    tokio::spawn(async {
        let mut log_interval = interval(Duration::from_secs(2));
        log_interval.tick().await;

        loop {
            let start = Instant::now();
            log_interval.tick().await;

            let captured_frames = METER.get_reset_captured();
            let reacted_frames = METER.get_reset_reacted();
            let skipped_frames = METER.get_reset_skipped();
            let elapsed = start.elapsed().as_secs_f32();

            if captured_frames > 0 {
                log::info!(
                    "Captured frames per second: {:.2}",
                    captured_frames as f32 / elapsed
                )
            }
            if reacted_frames > 0 {
                log::info!(
                    "Reacted frames per second: {:.2}",
                    reacted_frames as f32 / elapsed
                )
            }
            if skipped_frames > 0 {
                log::warn!("Skipped {skipped_frames} frames in {elapsed:.1}s")
            }
        }
    })
}
