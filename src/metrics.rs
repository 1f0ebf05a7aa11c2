// Performance metrics module
//
// Lightweight counters for the device-command path, logged on shutdown

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Device-command metrics
///
/// Uses atomic operations for thread-safe tracking without locks. The
/// [`LaserService`](crate::services::LaserService) records every serial
/// transaction here and the summary is logged when the panel shuts down.
#[derive(Debug)]
pub struct Metrics {
    /// Serial commands sent to the laser
    pub commands_sent: AtomicUsize,

    /// Serial commands that failed (timeout, rejection, I/O)
    pub command_errors: AtomicUsize,

    /// Status queries issued by the emission wait and the panel
    pub status_polls: AtomicUsize,

    /// Emission waits that ended with the emitting sentinel
    pub emission_waits_succeeded: AtomicUsize,

    /// Emission waits that exhausted their poll budget
    pub emission_waits_timed_out: AtomicUsize,

    /// Total time spent waiting for emission, in milliseconds
    pub emission_wait_time_ms: AtomicU64,

    /// Application start time
    start_time: Instant,
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        Self {
            commands_sent: AtomicUsize::new(0),
            command_errors: AtomicUsize::new(0),
            status_polls: AtomicUsize::new(0),
            emission_waits_succeeded: AtomicUsize::new(0),
            emission_waits_timed_out: AtomicUsize::new(0),
            emission_wait_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a serial command
    pub fn record_command(&self) {
        self.commands_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed serial command
    pub fn record_command_error(&self) {
        self.command_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a status poll
    pub fn record_status_poll(&self) {
        self.status_polls.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome and duration of an emission wait
    pub fn record_emission_wait(&self, emitting: bool, elapsed: Duration) {
        if emitting {
            self.emission_waits_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.emission_waits_timed_out.fetch_add(1, Ordering::Relaxed);
        }
        self.emission_wait_time_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        let uptime = self.uptime();
        tracing::info!("=== Session Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", uptime.as_secs_f64());
        tracing::info!(
            "Commands: {} sent, {} failed ({} status polls)",
            self.commands_sent.load(Ordering::Relaxed),
            self.command_errors.load(Ordering::Relaxed),
            self.status_polls.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Emission waits: {} reached emission, {} timed out, {:.1}s waiting",
            self.emission_waits_succeeded.load(Ordering::Relaxed),
            self.emission_waits_timed_out.load(Ordering::Relaxed),
            self.emission_wait_time_ms.load(Ordering::Relaxed) as f64 / 1000.0
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
