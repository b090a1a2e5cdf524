//! Clock & Pacer (spec.md §4.1): translates a logical sample index into a
//! wall-clock-paced emission schedule on LSL's shared local clock.

use tracing::warn;

/// Thin wrapper around `lsl::local_clock()`, kept as its own type so callers
/// never reach for `std::time` when they mean LSL's clock domain (the same
/// separation `TimeSync` draws in the device-bridge LSL integration this
/// engine is descended from).
#[derive(Debug, Clone, Copy, Default)]
pub struct Clock;

impl Clock {
    pub fn now(&self) -> f64 {
        lsl::local_clock()
    }
}

/// Drives the emit-then-sleep-until loop described in spec.md §4.1.
///
/// `nominal_srate = 0.0` means an irregular-rate stream: the pacer never
/// sleeps and every tick is stamped with the clock reading taken at emission
/// time rather than a precomputed logical timestamp.
#[derive(Debug, Clone)]
pub struct Pacer {
    clock: Clock,
    delta: f64,
    latency: f64,
    logical_time: f64,
    irregular: bool,
}

impl Pacer {
    /// `start_time` becomes the timestamp of the first emitted sample.
    pub fn new(nominal_srate: f64, latency: f64, start_time: f64) -> Self {
        let irregular = nominal_srate <= 0.0;
        Self {
            clock: Clock,
            delta: if irregular { 0.0 } else { 1.0 / nominal_srate },
            latency,
            logical_time: start_time,
            irregular,
        }
    }

    /// Re-arm the pacer for a fresh START, per the invariant that every
    /// START updates `start_time` (spec.md §3 Invariants). Used on a
    /// PAUSE -> START resume, where the worker keeps its existing `Pacer`
    /// rather than building a new one.
    pub fn restart(&mut self, start_time: f64, latency: f64) {
        self.logical_time = start_time;
        self.latency = latency;
    }

    pub fn logical_time(&self) -> f64 {
        self.logical_time
    }

    /// Timestamp to stamp the next emitted sample with, without advancing
    /// the pacer. For irregular streams this is the clock reading right
    /// now; for regular streams it is the precomputed logical timestamp.
    pub fn next_timestamp(&self) -> f64 {
        if self.irregular {
            self.clock.now()
        } else {
            self.logical_time
        }
    }

    /// Advance past the sample just emitted and sleep until it is due,
    /// logging a "LATE" diagnostic (spec.md §4.1, §7) if the pacer has
    /// fallen behind by more than `latency`. Irregular streams never sleep.
    pub async fn advance_and_wait(&mut self) {
        if self.irregular {
            return;
        }

        self.logical_time += self.delta;

        let deficit = self.logical_time - self.clock.now();
        if deficit < -self.latency {
            warn!(
                deficit_ms = (-deficit) * 1000.0,
                "pacer running LATE by {:.1}ms", (-deficit) * 1000.0
            );
        }

        loop {
            let now = self.clock.now();
            if now >= self.logical_time - self.latency {
                break;
            }
            let remaining = self.logical_time - self.latency - now;
            tokio::time::sleep(std::time::Duration::from_secs_f64(remaining.max(0.0))).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn irregular_pacer_never_advances_logical_time() {
        let pacer = Pacer::new(0.0, 0.0, 10.0);
        assert!(pacer.irregular);
        assert_ne!(pacer.next_timestamp(), 10.0); // stamped with clock.now(), not start_time
    }

    #[tokio::test]
    async fn regular_pacer_advances_by_delta_each_tick() {
        let mut pacer = Pacer::new(1000.0, 10.0, 5.0);
        assert_eq!(pacer.next_timestamp(), 5.0);
        pacer.advance_and_wait().await;
        assert!((pacer.logical_time() - 5.001).abs() < 1e-9);
    }

    #[test]
    fn restart_reinitialises_logical_time_per_start_invariant() {
        let mut pacer = Pacer::new(500.0, 0.1, 1.0);
        pacer.restart(100.0, 0.2);
        assert_eq!(pacer.logical_time(), 100.0);
        assert_eq!(pacer.latency, 0.2);
    }
}
