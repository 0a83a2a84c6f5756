//! The scheduling loop.
//!
//! `Idle -> WaitingForFirstRun -> Scheduled <-> Running`, and `Stopped` from
//! anywhere. The first run is a cancellable wait on a deadline. After that
//! the loop polls every `poll_interval`, so a trigger may fire up to one poll
//! interval after its due time.
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::cycle::{CycleOutcome, CycleRunner};
use crate::error::LoopFault;
use crate::probe::Prober;
use crate::schedule::{ScheduleSpec, ScheduledJob};
use crate::storage::ReportStore;
use crate::types::Target;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Longest single sleep while waiting for the first run. The remaining time
/// is recomputed from the wall clock after each slice.
const MAX_WAIT_SLICE: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    WaitingForFirstRun,
    Scheduled,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Interrupted,
}

/// Owns the single [`ScheduledJob`] and drives cycles at their due times.
pub struct Orchestrator<P, S, C> {
    runner: CycleRunner<P, S, C>,
    target: Target,
    arguments: String,
    spec: ScheduleSpec,
    poll_interval: Duration,
    cancel: CancellationToken,
    state: LoopState,
    observer: Option<mpsc::UnboundedSender<LoopState>>,
    job: Option<ScheduledJob>,
    cycles: u64,
}

impl<P: Prober, S: ReportStore, C: Clock> Orchestrator<P, S, C> {
    pub fn new(
        runner: CycleRunner<P, S, C>,
        target: Target,
        arguments: impl Into<String>,
        spec: ScheduleSpec,
    ) -> Self {
        Self {
            runner,
            target,
            arguments: arguments.into(),
            spec,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancel: CancellationToken::new(),
            state: LoopState::Idle,
            observer: None,
            job: None,
            cycles: 0,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Receive every state transition, in order.
    pub fn with_state_observer(mut self, tx: mpsc::UnboundedSender<LoopState>) -> Self {
        self.observer = Some(tx);
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// The armed job, once the first run has been reached.
    pub fn job(&self) -> Option<&ScheduledJob> {
        self.job.as_ref()
    }

    /// Cycles that ran to completion, whatever their outcome.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run until interrupted. Only a [`LoopFault`] comes back as an error.
    pub async fn run(&mut self) -> Result<StopReason, LoopFault> {
        let result = self.drive().await;
        match &result {
            Ok(StopReason::Interrupted) => info!("scheduler stopped by user"),
            Err(fault) => warn!(error = %fault, "scheduler stopped on internal fault"),
        }
        self.transition(LoopState::Stopped);
        result
    }

    async fn drive(&mut self) -> Result<StopReason, LoopFault> {
        let first_run = self.spec.first_run();
        self.transition(LoopState::WaitingForFirstRun);
        info!(target = %self.target, %first_run, frequency = %self.spec.frequency(), "first scan scheduled, waiting");
        if !self.wait_until_first_run().await {
            return Ok(StopReason::Interrupted);
        }

        let mut job = ScheduledJob::arm(&self.spec);
        self.job = Some(job);
        self.transition(LoopState::Scheduled);
        info!(next_due = %job.next_due(), interval = %job.interval(), "recurring scans armed");

        loop {
            if job.is_due(self.runner.clock().now()) {
                self.transition(LoopState::Running);
                let outcome = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => None,
                    o = self.runner.run_cycle(&self.target, &self.arguments) => Some(o),
                };
                let Some(outcome) = outcome else {
                    info!("scan abandoned on interrupt");
                    return Ok(StopReason::Interrupted);
                };
                if let CycleOutcome::Failed(failure) = &outcome {
                    warn!(target = %self.target, reason = %failure, "scan cycle failed");
                }
                self.cycles += 1;

                let skipped = job.advance(self.runner.clock().now())?;
                if skipped > 0 {
                    warn!(skipped, "missed scheduled runs while busy; skipping ahead");
                }
                self.job = Some(job);
                self.transition(LoopState::Scheduled);
                info!(next_due = %job.next_due(), "next scan scheduled");
            }

            if !self.pause(self.poll_interval).await {
                return Ok(StopReason::Interrupted);
            }
        }
    }

    /// Wait until the wall clock reaches the first run. `false` on interrupt.
    async fn wait_until_first_run(&self) -> bool {
        let first_run = self.spec.first_run();
        loop {
            let remaining = first_run - self.runner.clock().now();
            if !remaining.is_positive() {
                return true;
            }
            let slice = remaining.unsigned_abs().min(MAX_WAIT_SLICE);
            if !self.pause(slice).await {
                return false;
            }
        }
    }

    /// Sleep unless interrupted first. `false` on interrupt.
    async fn pause(&self, d: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(d) => true,
        }
    }

    fn transition(&mut self, next: LoopState) {
        debug!(from = ?self.state, to = ?next, "scheduler state");
        self.state = next;
        if let Some(tx) = &self.observer {
            let _ = tx.send(next);
        }
    }
}

/// Cancel `token` on Ctrl-C, or on SIGTERM where available.
pub fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = term.recv() => {}
                    }
                }
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        token.cancel();
    });
}
