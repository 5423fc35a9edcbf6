//! Realtime counters for the host and the live binary. Native only.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

const PPM: u64 = 1_000_000;

/// Counters written by the audio thread, readable from anywhere.
///
/// Load is the fraction of the block period spent inside `process_block`,
/// stored in parts per million so it fits an atomic integer. Alongside the
/// most recent block the worst block since startup is kept, which is the
/// number that matters for dropout headroom.
#[derive(Default)]
pub struct EngineMetrics {
    /// Nanoseconds available per block. Zero until the host reports it;
    /// loads are not recorded before then.
    block_period_ns: AtomicU64,
    /// Load of the most recent block, in ppm of the block period.
    last_load_ppm: AtomicU32,
    /// Worst block seen, in ppm.
    peak_load_ppm: AtomicU32,
    pub beats_completed: AtomicU32,
    pub blocks_processed: AtomicU64,
}

impl EngineMetrics {
    /// Tells the metrics how much wall time one block is worth.
    pub fn set_block_period(&self, ns: u64) {
        self.block_period_ns.store(ns, Ordering::Relaxed);
    }

    /// Records the processing time of one block.
    pub fn record_block(&self, elapsed_ns: u64) {
        let period_ns = self.block_period_ns.load(Ordering::Relaxed);
        if period_ns == 0 {
            return;
        }
        // loads are capped at 400% of the block period
        let ppm = (elapsed_ns.saturating_mul(PPM) / period_ns).min(4 * PPM) as u32;
        self.last_load_ppm.store(ppm, Ordering::Relaxed);
        self.peak_load_ppm.fetch_max(ppm, Ordering::Relaxed);
    }

    /// Load of the most recent block, 1.0 meaning the whole block period.
    pub fn load(&self) -> f32 {
        self.last_load_ppm.load(Ordering::Relaxed) as f32 / PPM as f32
    }

    /// Worst block load seen since startup or the last [`reset_peak`].
    ///
    /// [`reset_peak`]: EngineMetrics::reset_peak
    pub fn peak_load(&self) -> f32 {
        self.peak_load_ppm.load(Ordering::Relaxed) as f32 / PPM as f32
    }

    pub fn reset_peak(&self) {
        self.peak_load_ppm.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_is_fraction_of_block_period() {
        let metrics = EngineMetrics::default();
        // nothing recorded until the block period is known
        metrics.record_block(10_000);
        assert_eq!(metrics.load(), 0.0);

        metrics.set_block_period(1_000_000);
        metrics.record_block(250_000);
        assert!((metrics.load() - 0.25).abs() < 1e-6);

        metrics.record_block(100_000);
        assert!((metrics.load() - 0.1).abs() < 1e-6);
        // peak remembers the worst block
        assert!((metrics.peak_load() - 0.25).abs() < 1e-6);

        metrics.reset_peak();
        assert_eq!(metrics.peak_load(), 0.0);
    }

    #[test]
    fn test_overlong_block_is_capped() {
        let metrics = EngineMetrics::default();
        metrics.set_block_period(1_000);
        metrics.record_block(u64::MAX / 2);
        assert!((metrics.load() - 4.0).abs() < 1e-6);
    }
}
