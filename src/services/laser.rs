use crate::metrics::Metrics;
use crate::services::driver::{DeviceStatus, DiodeLaser, DriverError};
use anyhow::{Context, Result, bail};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Timing budget of the bounded emission wait.
///
/// Defaults follow the device manual: lasing starts roughly five seconds
/// after turn-on, so wait a fixed 4 s and then check every 0.5 s, at most
/// 20 times, before giving up.
#[derive(Debug, Clone, Copy)]
pub struct EmissionWait {
    pub warmup: Duration,
    pub interval: Duration,
    pub max_polls: u32,
}

impl Default for EmissionWait {
    fn default() -> Self {
        Self {
            warmup: Duration::from_secs(4),
            interval: Duration::from_millis(500),
            max_polls: 20,
        }
    }
}

/// How an emission wait ended.
#[derive(Debug, Clone)]
pub enum EmissionOutcome {
    /// The device reported the emitting sentinel after `polls` status checks.
    Emitting { polls: u32 },
    /// The poll budget ran out; `last` is the final status pair seen, if any.
    TimedOut { last: Option<DeviceStatus> },
}

impl EmissionOutcome {
    pub fn is_emitting(&self) -> bool {
        matches!(self, EmissionOutcome::Emitting { .. })
    }
}

/// Service owning the laser handle and issuing device commands.
///
/// The handle lives behind a mutex and every transaction runs on the blocking
/// thread pool, so exactly one command is in flight at a time
/// ([`MAX_CONCURRENT_LASER_COMMANDS`](crate::models::MAX_CONCURRENT_LASER_COMMANDS))
/// and the GUI thread never touches the serial port.
///
/// # Design Philosophy
///
/// - **Framework-agnostic**: no Slint, no state manager - callers decide what
///   to do with outcomes
/// - **Bounded**: the emission wait is the only loop, and it cannot run past
///   its poll budget, whatever the device answers
pub struct LaserService {
    laser: Arc<Mutex<Box<dyn DiodeLaser>>>,
    metrics: Arc<Metrics>,
}

impl LaserService {
    /// Create a service around an opened laser handle.
    pub fn new(laser: Box<dyn DiodeLaser>, metrics: Arc<Metrics>) -> Self {
        Self {
            laser: Arc::new(Mutex::new(laser)),
            metrics,
        }
    }

    /// Run one device operation on the blocking pool.
    async fn with_laser<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut dyn DiodeLaser) -> Result<R, DriverError> + Send + 'static,
        R: Send + 'static,
    {
        let laser = Arc::clone(&self.laser);
        let metrics = Arc::clone(&self.metrics);

        let result = tokio::task::spawn_blocking(move || {
            let mut guard = laser.lock().unwrap();
            metrics.record_command();
            f(guard.as_mut())
        })
        .await
        .context("Laser command task panicked")?;

        if result.is_err() {
            self.metrics.record_command_error();
        }

        result.map_err(anyhow::Error::from)
    }

    /// Query the device identity string.
    pub async fn identity(&self) -> Result<String> {
        self.with_laser(|laser| laser.identity()).await
    }

    /// Command the laser on.
    pub async fn turn_on(&self) -> Result<()> {
        self.with_laser(|laser| laser.set_enabled(true)).await
    }

    /// Command the laser off.
    pub async fn turn_off(&self) -> Result<()> {
        self.with_laser(|laser| laser.set_enabled(false)).await
    }

    /// Forward a power setpoint to the device.
    ///
    /// Values above `limit_mw` never reach the wire; the SpinBox already
    /// range-limits input, this is the guard behind it.
    pub async fn set_power(&self, milliwatts: u16, limit_mw: u16) -> Result<()> {
        if milliwatts > limit_mw {
            bail!(
                "Power setpoint {} mW exceeds the {} mW limit",
                milliwatts,
                limit_mw
            );
        }
        self.with_laser(move |laser| laser.set_power(milliwatts))
            .await
    }

    /// Query the status pair once.
    pub async fn poll_status(&self) -> Result<DeviceStatus> {
        self.metrics.record_status_poll();
        self.with_laser(|laser| laser.status()).await
    }

    /// Wait for the device to report the emitting sentinel.
    ///
    /// Sleeps through the fixed warm-up, then polls status at the configured
    /// interval until the sentinel appears or the poll budget is spent. A
    /// failed status read consumes a poll slot rather than aborting, so the
    /// wait stays bounded against a wedged device. Each decoded status pair
    /// is handed to `on_status` so the caller can surface it.
    pub async fn wait_for_emission<F>(
        &self,
        wait: EmissionWait,
        mut on_status: F,
    ) -> Result<EmissionOutcome>
    where
        F: FnMut(&DeviceStatus) + Send,
    {
        let start = Instant::now();
        tokio::time::sleep(wait.warmup).await;

        let mut last = None;

        for poll in 1..=wait.max_polls {
            match self.poll_status().await {
                Ok(status) => {
                    on_status(&status);
                    if status.is_emitting() {
                        self.metrics.record_emission_wait(true, start.elapsed());
                        return Ok(EmissionOutcome::Emitting { polls: poll });
                    }
                    last = Some(status);
                }
                Err(e) => {
                    tracing::warn!("Status poll {}/{} failed: {}", poll, wait.max_polls, e);
                }
            }

            if poll < wait.max_polls {
                tokio::time::sleep(wait.interval).await;
            }
        }

        self.metrics.record_emission_wait(false, start.elapsed());
        Ok(EmissionOutcome::TimedOut { last })
    }

    /// Shut the device down: zero power and disable if it was on, then close
    /// the port.
    pub async fn shutdown(&self, laser_on: bool) -> Result<()> {
        if laser_on {
            self.set_power(0, crate::models::MAX_POWER_MW).await?;
            self.turn_off().await?;
        }
        self.with_laser(|laser| laser.close()).await
    }
}
