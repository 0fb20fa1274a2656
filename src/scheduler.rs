//! Polling scheduler.
//!
//! Drives a [`PollDelegate`] at a fixed interval on a dedicated worker
//! thread.  The scheduler knows nothing about devices or frames: it only
//! decides *when* a cycle runs and what happens when cycles fail.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Worker thread (futures_lite::future::block_on)              │
//! │                                                              │
//! │   ┌──────────┐  ok    ┌─────────────┐                        │
//! │   │  cycle   │ ─────▶ │ sleep       │ ──┐                    │
//! │   │ (guard)  │        │ interval    │   │                    │
//! │   └────┬─────┘        └─────────────┘   │                    │
//! │        │ err          ┌─────────────┐   │                    │
//! │        └────────────▶ │ sleep       │ ──┤                    │
//! │        │              │ backoff 2s  │   │                    │
//! │        │ hung / 30s   └─────────────┘   │                    │
//! │        └──▶ on_fatal ─▶ exit            │                    │
//! │   ▲                                     │                    │
//! │   └─────────────────────────────────────┘                    │
//! │                                                              │
//! │   every await is raced against the CancelToken               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each start creates a fresh [`CancelToken`]; stop cancels it, waits for
//! the worker with a bound and joins it.  The token and thread handle are
//! taken out of the scheduler exactly once.

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use futures_lite::future;
use log::{debug, info, warn};

use crate::app::ports::PollDelegate;
use crate::cancel::{self, CancelToken};
use crate::config::{self, ScaleConfig};
use crate::error::{Error, Result, TransportError};

// ═══════════════════════════════════════════════════════════════
//  Timing
// ═══════════════════════════════════════════════════════════════

/// Timing knobs for one scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerTiming {
    /// Pause after a failed cycle.
    pub failure_backoff: Duration,
    /// Longest stretch without a successful cycle before reading halts.
    pub watchdog: Duration,
}

impl Default for SchedulerTiming {
    fn default() -> Self {
        Self::from_config(&ScaleConfig::default())
    }
}

impl SchedulerTiming {
    pub fn from_config(config: &ScaleConfig) -> Self {
        Self {
            failure_backoff: config.failure_backoff(),
            watchdog: config.watchdog_timeout(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  In-flight guard
// ═══════════════════════════════════════════════════════════════

/// Held for the duration of one read cycle.  Released on drop.
#[derive(Debug)]
pub struct CycleGuard {
    flag: Arc<AtomicBool>,
}

impl CycleGuard {
    fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// ═══════════════════════════════════════════════════════════════
//  Worker bookkeeping
// ═══════════════════════════════════════════════════════════════

/// Completion flag the worker raises on every exit path.
struct Finished {
    done: AtomicBool,
    signal: Signal<CriticalSectionRawMutex, ()>,
}

impl Finished {
    fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
            signal: Signal::new(),
        }
    }

    fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    async fn wait(&self) {
        while !self.is_done() {
            self.signal.wait().await;
        }
    }
}

/// Raises [`Finished`] when the worker body returns or unwinds.
struct FinishGuard(Arc<Finished>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.done.store(true, Ordering::Release);
        self.0.signal.signal(());
    }
}

struct Worker {
    cancel: CancelToken,
    finished: Arc<Finished>,
    handle: JoinHandle<()>,
}

/// How one guarded cycle ended.
enum CycleEnd {
    Done(Result<()>),
    Stopped,
    Hung,
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler
// ═══════════════════════════════════════════════════════════════

/// Per-device polling scheduler.
pub struct PollScheduler {
    label: String,
    timing: SchedulerTiming,
    in_flight: Arc<AtomicBool>,
    worker: Mutex<Option<Worker>>,
}

impl PollScheduler {
    pub fn new(label: impl Into<String>, timing: SchedulerTiming) -> Self {
        Self {
            label: label.into(),
            timing,
            in_flight: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Claim the in-flight slot outside the loop (initial reads).
    /// `None` while a cycle is running.
    pub fn try_begin_cycle(&self) -> Option<CycleGuard> {
        CycleGuard::try_acquire(&self.in_flight)
    }

    pub fn cycle_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// True while a worker exists and has not exited on its own.
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .map(|w| w.as_ref().is_some_and(|w| !w.finished.is_done()))
            .unwrap_or(false)
    }

    /// Spawn the polling worker.  A no-op if one is already running.
    pub fn start<D: PollDelegate>(&self, delegate: Arc<D>, interval: Duration) -> Result<()> {
        config::validate_interval(interval)?;

        let mut slot = self
            .worker
            .lock()
            .map_err(|_| Error::Worker("scheduler lock poisoned".into()))?;
        if let Some(w) = slot.as_ref() {
            if !w.finished.is_done() {
                debug!("Scheduler[{}]: already running", self.label);
                return Ok(());
            }
        }
        // A worker that exited on its own (fatal) is reaped here.
        if let Some(stale) = slot.take() {
            reap(&self.label, stale);
        }

        let cancel = CancelToken::new();
        let finished = Arc::new(Finished::new());
        let timing = self.timing;
        let in_flight = self.in_flight.clone();
        let label = self.label.clone();

        let handle = {
            let cancel = cancel.clone();
            let finished = finished.clone();
            std::thread::Builder::new()
                .name(format!("poll-{}", self.label))
                .spawn(move || {
                    let _finish = FinishGuard(finished);
                    future::block_on(run_loop(
                        &label, delegate, interval, timing, cancel, in_flight,
                    ));
                })
                .map_err(|e| Error::Worker(e.to_string()))?
        };

        info!(
            "Scheduler[{}]: started ({}ms interval)",
            self.label,
            interval.as_millis()
        );
        *slot = Some(Worker {
            cancel,
            finished,
            handle,
        });
        Ok(())
    }

    /// Cancel the worker and wait up to `wait` for it to exit.
    ///
    /// Returns `true` if no worker was running or it exited in time.
    pub async fn stop(&self, wait: Duration) -> bool {
        let worker = match self.worker.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        let Some(worker) = worker else {
            return true;
        };

        worker.cancel.cancel();
        if worker.handle.thread().id() == std::thread::current().id() {
            // Stopped from inside a cycle; the loop exits on its next check.
            return true;
        }
        let exited = worker.finished.is_done()
            || future::or(
                async {
                    worker.finished.wait().await;
                    true
                },
                async {
                    async_io_mini::Timer::after(wait).await;
                    false
                },
            )
            .await;

        if exited {
            reap(&self.label, worker);
            info!("Scheduler[{}]: stopped", self.label);
        } else {
            warn!(
                "Scheduler[{}]: worker did not exit within {}ms, detaching",
                self.label,
                wait.as_millis()
            );
        }
        exited
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.worker.lock() {
            if let Some(w) = slot.take() {
                w.cancel.cancel();
            }
        }
    }
}

fn reap(label: &str, worker: Worker) {
    if worker.handle.thread().id() == std::thread::current().id() {
        return;
    }
    if worker.handle.join().is_err() {
        warn!("Scheduler[{label}]: worker panicked");
    }
}

// ═══════════════════════════════════════════════════════════════
//  Loop body
// ═══════════════════════════════════════════════════════════════

async fn run_loop<D: PollDelegate>(
    label: &str,
    delegate: Arc<D>,
    interval: Duration,
    timing: SchedulerTiming,
    cancel: CancelToken,
    in_flight: Arc<AtomicBool>,
) {
    let mut last_success = Instant::now();

    while !cancel.is_cancelled() {
        let started = Instant::now();

        let Some(guard) = CycleGuard::try_acquire(&in_flight) else {
            debug!("Scheduler[{label}]: previous cycle in flight, skipping");
            if !cancel::sleep_unless_cancelled(interval, &cancel).await {
                break;
            }
            continue;
        };

        let budget = timing.watchdog.saturating_sub(last_success.elapsed());
        let end = future::or(
            async {
                match cancel.run_until_cancelled(delegate.poll_cycle(&cancel)).await {
                    Some(result) => CycleEnd::Done(result),
                    None => CycleEnd::Stopped,
                }
            },
            async {
                async_io_mini::Timer::after(budget).await;
                CycleEnd::Hung
            },
        )
        .await;
        drop(guard);
        if cancel.is_cancelled() {
            break;
        }

        let pause = match end {
            CycleEnd::Stopped => break,
            CycleEnd::Done(Ok(())) => {
                last_success = Instant::now();
                interval.saturating_sub(started.elapsed())
            }
            CycleEnd::Done(Err(e)) => {
                if last_success.elapsed() >= timing.watchdog {
                    fatal(label, delegate.as_ref(), &cancel);
                    break;
                }
                warn!(
                    "Scheduler[{label}]: cycle failed ({e}), backing off {}ms",
                    timing.failure_backoff.as_millis()
                );
                timing.failure_backoff
            }
            CycleEnd::Hung => {
                fatal(label, delegate.as_ref(), &cancel);
                break;
            }
        };

        if !cancel::sleep_unless_cancelled(pause, &cancel).await {
            break;
        }
    }
    debug!("Scheduler[{label}]: loop exited");
}

fn fatal<D: PollDelegate>(label: &str, delegate: &D, cancel: &CancelToken) {
    if cancel.is_cancelled() {
        return;
    }
    warn!("Scheduler[{label}]: watchdog expired, halting reads");
    delegate.on_fatal(&Error::Transport(TransportError::Timeout));
}
