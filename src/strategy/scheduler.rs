//! Phase sequencing and the scheduler loop

use crate::{
    config::ScheduleConfig,
    strategy::orchestrator::PairOrchestrator,
    utils::metrics,
    Result,
};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info};

/// Lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// One-shot startup reconciliation
    Reconcile,
    /// Relationship screening
    Screen,
    /// Entry direction selection
    SelectSide,
    /// Position entry
    Open,
    /// Position exit
    Close,
}

impl Phase {
    /// Periodic phases in tie-break order
    pub const PERIODIC: [Phase; 4] = [Phase::Screen, Phase::SelectSide, Phase::Open, Phase::Close];

    /// Stable name used in logs and metrics
    pub fn name(self) -> &'static str {
        match self {
            Phase::Reconcile => "reconcile",
            Phase::Screen => "screen",
            Phase::SelectSide => "select_side",
            Phase::Open => "open",
            Phase::Close => "close",
        }
    }

    fn slot(self) -> Option<usize> {
        Self::PERIODIC.iter().position(|p| *p == self)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which periodic phases are armed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerStage {
    /// Startup reconciliation pending, nothing armed
    Reconciling,
    /// Only screening armed
    Idle,
    /// Screening and side selection armed
    Selecting,
    /// Every periodic phase armed
    OpenClose,
}

/// Deadlines of the periodic phases and the pipeline stage they imply
///
/// Screen runs first; a successful screen arms side selection immediately and a successful
/// side selection arms open and close immediately. Starting a phase disarms the phases that
/// follow it in the pipeline, and a failed phase arms nothing.
#[derive(Debug, Clone)]
pub struct PhaseSequencer {
    stage: SequencerStage,
    periods: [Duration; 4],
    due: [Option<Instant>; 4],
}

impl PhaseSequencer {
    /// Sequencer with the configured periods, awaiting reconciliation
    pub fn new(schedule: &ScheduleConfig) -> Self {
        Self {
            stage: SequencerStage::Reconciling,
            periods: [
                schedule.screen_interval(),
                schedule.select_interval(),
                schedule.trade_interval(),
                schedule.trade_interval(),
            ],
            due: [None; 4],
        }
    }

    /// Current stage
    pub fn stage(&self) -> SequencerStage {
        self.stage
    }

    /// Deadline of a periodic phase, if armed
    pub fn due(&self, phase: Phase) -> Option<Instant> {
        phase.slot().and_then(|slot| self.due[slot])
    }

    /// Earliest armed phase; ties go to the earlier phase
    pub fn next_due(&self) -> Option<(Phase, Instant)> {
        Phase::PERIODIC
            .iter()
            .filter_map(|&phase| self.due(phase).map(|due| (phase, due)))
            .min_by_key(|&(phase, due)| (due, phase))
    }

    /// Record that `phase` starts at `now`
    pub fn begin(&mut self, phase: Phase, now: Instant) {
        match phase {
            Phase::Screen => {
                self.disarm(&[Phase::SelectSide, Phase::Open, Phase::Close]);
                self.stage = SequencerStage::Idle;
            }
            Phase::SelectSide => {
                self.disarm(&[Phase::Open, Phase::Close]);
                self.stage = SequencerStage::Selecting;
            }
            Phase::Reconcile | Phase::Open | Phase::Close => {}
        }

        if let Some(slot) = phase.slot() {
            let scheduled = self.due[slot].unwrap_or(now);
            let mut next = scheduled + self.periods[slot];
            if next <= now {
                next = now + self.periods[slot];
            }
            self.due[slot] = Some(next);
        }
    }

    /// Record that `phase` finished at `now`
    pub fn complete(&mut self, phase: Phase, succeeded: bool, now: Instant) {
        if !succeeded {
            return;
        }
        match phase {
            Phase::Reconcile => {
                self.arm(Phase::Screen, now);
                self.stage = SequencerStage::Idle;
            }
            Phase::Screen => {
                self.arm(Phase::SelectSide, now);
                self.stage = SequencerStage::Selecting;
            }
            Phase::SelectSide => {
                self.arm(Phase::Open, now);
                self.arm(Phase::Close, now);
                self.stage = SequencerStage::OpenClose;
            }
            Phase::Open | Phase::Close => {}
        }
    }

    fn arm(&mut self, phase: Phase, at: Instant) {
        if let Some(slot) = phase.slot() {
            self.due[slot] = Some(at);
        }
    }

    fn disarm(&mut self, phases: &[Phase]) {
        for slot in phases.iter().filter_map(|p| p.slot()) {
            self.due[slot] = None;
        }
    }
}

/// Drives the orchestrator through its phases on their timers
///
/// The scheduler is the only owner of the orchestrator, so exactly one phase runs at a time.
pub struct PhaseScheduler {
    orchestrator: PairOrchestrator,
    sequencer: PhaseSequencer,
}

impl PhaseScheduler {
    /// Create a scheduler around an orchestrator
    pub fn new(orchestrator: PairOrchestrator, schedule: &ScheduleConfig) -> Self {
        Self {
            orchestrator,
            sequencer: PhaseSequencer::new(schedule),
        }
    }

    /// The orchestrator and its tracked pairs
    pub fn orchestrator(&self) -> &PairOrchestrator {
        &self.orchestrator
    }

    /// Phase deadlines
    pub fn sequencer(&self) -> &PhaseSequencer {
        &self.sequencer
    }

    /// Run until Ctrl-C
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Reconcile, then run phases as they fall due until `shutdown` resolves
    ///
    /// A reconciliation failure is returned. Later phase failures are logged and the loop goes
    /// on. `shutdown` is only observed between phases.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.execute(Phase::Reconcile).await?;

        tokio::pin!(shutdown);
        loop {
            let Some((phase, due)) = self.sequencer.next_due() else {
                shutdown.as_mut().await;
                break;
            };

            tokio::select! {
                biased;
                _ = shutdown.as_mut() => break,
                _ = tokio::time::sleep_until(due) => {}
            }

            // Phase failures only skip this run
            let _ = self.execute(phase).await;
        }

        info!(tracked_pairs = self.orchestrator.pairs().len(), "Scheduler stopped");
        Ok(())
    }

    async fn execute(&mut self, phase: Phase) -> Result<()> {
        let started = Instant::now();
        self.sequencer.begin(phase, started);

        let result = self.orchestrator.run_phase(phase).await;

        let finished = Instant::now();
        metrics::record_phase(phase.name(), result.is_ok(), finished - started);
        match &result {
            Ok(()) => info!(%phase, tracked_pairs = self.orchestrator.pairs().len(), "Phase complete"),
            Err(e) => error!(%phase, error = %format!("{:#}", e), "Phase aborted"),
        }

        self.sequencer.complete(phase, result.is_ok(), finished);
        result
    }
}
