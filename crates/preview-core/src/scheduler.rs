//! Periodic driver for [`Reconciler::run_pass`].

use crate::config::ControllerConfig;
use crate::error::Result;
use crate::reconciler::{PassOutcome, Reconciler};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, info_span, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    pub interval: Duration,
    /// Consecutive fatal pass failures tolerated before the loop gives up.
    pub max_consecutive_failures: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(120),
            max_consecutive_failures: 3,
        }
    }
}

impl LoopConfig {
    pub fn from_config(cfg: &ControllerConfig) -> Self {
        Self {
            interval: cfg.interval(),
            ..Default::default()
        }
    }
}

/// Requests a graceful stop of a running [`Scheduler`].
#[derive(Debug, Clone)]
pub struct Stopper {
    tx: watch::Sender<bool>,
}

impl Stopper {
    pub fn stop(&self) {
        let _ = self.tx.send(true);
    }
}

pub struct Scheduler {
    reconciler: Arc<Reconciler>,
    config: LoopConfig,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(reconciler: Arc<Reconciler>, config: LoopConfig) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            reconciler,
            config,
            stop_tx,
            stop_rx,
        }
    }

    pub fn stopper(&self) -> Stopper {
        Stopper {
            tx: self.stop_tx.clone(),
        }
    }

    /// Run passes until stopped.
    ///
    /// The first pass starts immediately. A stop request never interrupts a
    /// pass in flight; the loop exits once it finishes. Returns the last
    /// error once `max_consecutive_failures` fatal failures happened in a
    /// row. Transient failures are logged and retried on the next tick.
    pub async fn run(&mut self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut failures = 0usize;
        let mut pass_no = 0u64;

        info!(interval_secs = self.config.interval.as_secs(), "reconciliation loop started");
        loop {
            if *self.stop_rx.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = self.stop_rx.changed() => {
                    if changed.is_err() || *self.stop_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    pass_no += 1;
                    let span = info_span!("pass", n = pass_no);
                    match self.reconciler.run_pass().instrument(span).await {
                        Ok(PassOutcome::Completed(_)) => failures = 0,
                        Ok(PassOutcome::Skipped) => {}
                        Err(e) if e.is_fatal() => {
                            failures += 1;
                            error!(error = %e, failures, "pass failed");
                            if failures >= self.config.max_consecutive_failures {
                                error!(failures, "too many consecutive failures, stopping");
                                return Err(e);
                            }
                        }
                        Err(e) => warn!(error = %e, "pass aborted, retrying next tick"),
                    }
                }
            }
        }
        info!("reconciliation loop stopped");
        Ok(())
    }
}
