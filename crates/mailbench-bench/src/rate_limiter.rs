//! Shared permit-based rate limiter
//!
//! One producer task wakes every `1s / rate` (never more often than once a
//! millisecond) and releases the permits owed since start, `floor(elapsed ×
//! rate)` minus those already accounted for. Workers race for permits on a
//! single semaphore. Unclaimed permits are capped at a short burst window, so
//! idle periods never build up a burst. This bounds aggregate throughput, not
//! per-worker throughput.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Finest cadence the producer wakes at; the timer does not resolve below it.
const MIN_CADENCE: Duration = Duration::from_millis(1);

/// Unclaimed permits never exceed this much time's worth of ticks.
const BURST_WINDOW: Duration = Duration::from_millis(10);

pub struct RateLimiter {
    permits: Arc<Semaphore>,
    period: Duration,
    burst: usize,
    producer: JoinHandle<()>,
}

impl RateLimiter {
    /// Starts releasing `rate_per_sec` permits per second until `stop` fires.
    /// The first permit is due one period after start.
    pub fn start(rate_per_sec: u32, stop: CancellationToken) -> Self {
        let rate = rate_per_sec.max(1);
        let period = (Duration::from_secs(1) / rate).max(Duration::from_nanos(1));
        let cadence = period.max(MIN_CADENCE);
        let burst = permits_owed(BURST_WINDOW, rate).max(1);
        let permits = Arc::new(Semaphore::new(0));

        let producer = tokio::spawn(release_permits(
            Arc::clone(&permits),
            rate,
            cadence,
            burst,
            stop,
        ));

        Self {
            permits,
            period,
            burst,
            producer,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Most permits that can be waiting unclaimed at once.
    pub fn burst(&self) -> usize {
        self.burst
    }

    /// Waits for the next permit. Returns `false` once the limiter has stopped.
    pub async fn acquire(&self) -> bool {
        match self.permits.acquire().await {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.producer.abort();
    }
}

async fn release_permits(
    permits: Arc<Semaphore>,
    rate: u32,
    cadence: Duration,
    burst: usize,
    stop: CancellationToken,
) {
    let start = Instant::now();
    let mut ticker = interval_at(start + cadence, cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Permits accounted for so far, including those dropped at the burst cap.
    let mut accounted = 0usize;
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                let owed = permits_owed(start.elapsed(), rate);
                let due = owed.saturating_sub(accounted);
                accounted = owed;

                let room = burst.saturating_sub(permits.available_permits());
                permits.add_permits(due.min(room));
            }
        }
    }
    permits.close();
}

/// Whole permits a `rate`-per-second source has produced after `elapsed`.
fn permits_owed(elapsed: Duration, rate: u32) -> usize {
    let owed = elapsed.as_nanos() * u128::from(rate) / 1_000_000_000;
    usize::try_from(owed).unwrap_or(usize::MAX)
}
