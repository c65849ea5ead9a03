// MedScan - app/scan.rs
//
// Scan lifecycle management. `ScanStateMachine` owns the session, the image
// queue and the cooldown guard, and is the only thing that mutates them.
//
// Architecture:
//   - Actions (`start_scan`, `submit_image`, `submit_images`, `analyze_next`,
//     `restart`) are synchronous. They return an `ActionOutcome` so callers
//     can see a refused action; a refusal never changes state.
//   - Accepted submissions preprocess the head image, then spawn the
//     analysis task (`app::pipeline`) on the current tokio runtime.
//   - The task reports over an mpsc channel; the owner applies messages with
//     `poll_progress` (non-blocking) or `next_update` (async).
//   - Single-flight: at most one image is in flight, and every terminal
//     session arms the cooldown exactly once.
//
//   idle --start_scan--> scanning --submit_image--> analyzing
//   idle --submit_images-------------------------> analyzing
//   analyzing --finished (ok or error)--> results
//   results --analyze_next--> analyzing | idle (queue empty)
//   idle/scanning/results --restart--> idle

use crate::app::cooldown::CooldownGuard;
use crate::app::pipeline;
use crate::app::service::AnalysisService;
use crate::core::model::{
    AnalysisStep, EncodedImage, NormalizedForensicResult, NormalizedMedicineInfo, RawImage,
    ScanOutcome, ScanProgress, ScanRecord, ScanSession, ScanState, StageSpec, StepStatus,
    UnifiedAnalysisResult,
};
use crate::core::preprocess::{self, PreprocessConfig};
use crate::core::queue::ImageQueue;
use crate::core::reconcile;
use crate::platform::clock::Clock;
use crate::platform::config::{self, AppConfig};
use crate::platform::store::KeyValueStore;
use crate::util::constants;
use crate::util::error::AnalysisError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver};
use uuid::Uuid;

// =============================================================================
// Action results and wiring
// =============================================================================

/// What happened to an action. Refusals leave the session untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The action ran.
    Accepted,
    /// Refused by the cooldown guard.
    CoolingDown { remaining_secs: u64 },
    /// The action has no transition from the current state.
    NotAllowed { state: ScanState },
}

impl ActionOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Injected collaborators.
#[derive(Debug, Clone)]
pub struct ScanDeps {
    pub service: Arc<dyn AnalysisService>,
    pub store: Arc<dyn KeyValueStore>,
    pub clock: Arc<dyn Clock>,
}

/// Session tunables.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub cooldown_window_secs: u64,
    pub preprocess: PreprocessConfig,
    pub stages: Vec<StageSpec>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            cooldown_window_secs: constants::DEFAULT_COOLDOWN_WINDOW_SECS,
            preprocess: PreprocessConfig::default(),
            stages: config::default_stages(),
        }
    }
}

impl From<&AppConfig> for ScanConfig {
    fn from(app: &AppConfig) -> Self {
        Self {
            cooldown_window_secs: app.cooldown_window_secs,
            preprocess: app.preprocess.clone(),
            stages: app.stages.clone(),
        }
    }
}

// =============================================================================
// ScanStateMachine
// =============================================================================

/// Top-level scan controller.
#[derive(Debug)]
pub struct ScanStateMachine {
    session: ScanSession,
    queue: ImageQueue,
    cooldown: CooldownGuard,
    history: Vec<ScanRecord>,
    config: ScanConfig,
    service: Arc<dyn AnalysisService>,
    clock: Arc<dyn Clock>,

    /// Progress from the in-flight analysis task, if any.
    progress_rx: Option<UnboundedReceiver<ScanProgress>>,
}

impl ScanStateMachine {
    /// Create an idle session, recovering any persisted cooldown.
    pub fn new(deps: ScanDeps, config: ScanConfig) -> Self {
        let cooldown = CooldownGuard::recover_on_init(
            config.cooldown_window_secs,
            deps.store,
            Arc::clone(&deps.clock),
        );

        tracing::info!(
            cooldown = cooldown.remaining(),
            persistent = cooldown.is_persistent(),
            stages = config.stages.len(),
            "Scan session ready"
        );

        Self {
            session: ScanSession::default(),
            queue: ImageQueue::new(),
            cooldown,
            history: Vec::new(),
            config,
            service: deps.service,
            clock: deps.clock,
            progress_rx: None,
        }
    }

    // -------------------------------------------------------------------------
    // Observables
    // -------------------------------------------------------------------------

    pub fn state(&self) -> ScanState {
        self.session.state
    }

    pub fn session(&self) -> &ScanSession {
        &self.session
    }

    pub fn current_image(&self) -> Option<&EncodedImage> {
        self.session.current_image.as_ref()
    }

    pub fn analysis_steps(&self) -> &[AnalysisStep] {
        &self.session.steps
    }

    pub fn medicine_info(&self) -> Option<&NormalizedMedicineInfo> {
        self.session.medicine_info.as_ref()
    }

    pub fn forensic_result(&self) -> Option<&NormalizedForensicResult> {
        self.session.forensic_result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.session.error.as_deref()
    }

    pub fn warning(&self) -> Option<&str> {
        self.session.warning.as_deref()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn cooldown_remaining(&self) -> u64 {
        self.cooldown.remaining()
    }

    /// Terminal sessions, oldest first.
    pub fn history(&self) -> &[ScanRecord] {
        &self.history
    }

    // -------------------------------------------------------------------------
    // Actions
    // -------------------------------------------------------------------------

    /// idle → scanning.
    pub fn start_scan(&mut self) -> ActionOutcome {
        if let Some(refused) = self.check(&[ScanState::Idle], true, "start_scan") {
            return refused;
        }
        self.session.clear_outcome();
        self.transition(ScanState::Scanning);
        ActionOutcome::Accepted
    }

    /// scanning → analyzing (or idle with an error if the image is unusable).
    pub fn submit_image(&mut self, image: RawImage) -> ActionOutcome {
        if let Some(refused) = self.check(&[ScanState::Scanning], false, "submit_image") {
            return refused;
        }
        self.begin(image);
        ActionOutcome::Accepted
    }

    /// Queue a batch and start on its head. An empty batch is a `restart`.
    pub fn submit_images(&mut self, images: Vec<RawImage>) -> ActionOutcome {
        if images.is_empty() {
            return self.restart();
        }
        if let Some(refused) = self.check(
            &[ScanState::Idle, ScanState::Scanning],
            true,
            "submit_images",
        ) {
            return refused;
        }

        let queued = self.queue.enqueue_batch(images);
        tracing::info!(queued, "Image batch queued");
        self.dispatch_next();
        ActionOutcome::Accepted
    }

    /// results → analyzing on the next queued image, or idle if none is left.
    ///
    /// Also accepted from idle while images remain queued, which is where a
    /// discarded (unreadable) image leaves the rest of its batch.
    pub fn analyze_next(&mut self) -> ActionOutcome {
        let state = self.session.state;
        if state == ScanState::Idle && self.queue.is_empty() {
            return ActionOutcome::NotAllowed { state };
        }
        if let Some(refused) = self.check(
            &[ScanState::Results, ScanState::Idle],
            true,
            "analyze_next",
        ) {
            return refused;
        }
        self.dispatch_next();
        ActionOutcome::Accepted
    }

    /// Back to a clean idle session. Pending images are dropped.
    pub fn restart(&mut self) -> ActionOutcome {
        if let Some(refused) = self.check(
            &[ScanState::Idle, ScanState::Scanning, ScanState::Results],
            true,
            "restart",
        ) {
            return refused;
        }
        if !self.queue.is_empty() {
            tracing::info!(dropped = self.queue.len(), "Pending images discarded");
            self.queue.clear();
        }
        self.session.clear_outcome();
        self.transition(ScanState::Idle);
        ActionOutcome::Accepted
    }

    // -------------------------------------------------------------------------
    // Progress
    // -------------------------------------------------------------------------

    /// Apply every progress message already received, without waiting.
    /// Returns the number applied.
    pub fn poll_progress(&mut self) -> usize {
        let mut applied = 0;
        while let Some(rx) = self.progress_rx.as_mut() {
            match rx.try_recv() {
                Ok(msg) => self.apply(msg),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.finish(Err(task_vanished())),
            }
            applied += 1;
        }
        applied
    }

    /// Wait for and apply the next progress message. Returns false when no
    /// analysis is in flight.
    pub async fn next_update(&mut self) -> bool {
        let Some(rx) = self.progress_rx.as_mut() else {
            return false;
        };
        match rx.recv().await {
            Some(msg) => self.apply(msg),
            None => self.finish(Err(task_vanished())),
        }
        true
    }

    /// Apply progress until the in-flight analysis (if any) reaches `results`.
    pub async fn wait_until_settled(&mut self) {
        while self.next_update().await {}
    }

    /// One cooldown tick. Returns true while further ticks are needed.
    pub fn tick_cooldown(&mut self) -> bool {
        self.cooldown.tick()
    }

    /// Re-derive the cooldown counter from the wall clock.
    pub fn resync_cooldown(&mut self) {
        self.cooldown.resync();
    }

    /// Tick the cooldown once per second until it reaches zero, reporting
    /// the remaining seconds after each tick.
    pub async fn wait_for_cooldown<F>(&mut self, mut on_tick: F)
    where
        F: FnMut(u64),
    {
        if self.cooldown.is_ready() {
            return;
        }
        let period = Duration::from_millis(constants::COOLDOWN_TICK_INTERVAL_MS);
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            interval.tick().await;
            let more = self.cooldown.tick();
            on_tick(self.cooldown.remaining());
            if !more {
                break;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Guard an action. `None` means it may proceed.
    fn check(
        &self,
        allowed: &[ScanState],
        needs_cooldown: bool,
        action: &'static str,
    ) -> Option<ActionOutcome> {
        let state = self.session.state;
        if !allowed.contains(&state) {
            tracing::debug!(action, %state, "Action ignored in current state");
            return Some(ActionOutcome::NotAllowed { state });
        }
        if needs_cooldown && !self.cooldown.is_ready() {
            let remaining_secs = self.cooldown.remaining();
            tracing::info!(action, remaining_secs, "Action refused: cooling down");
            return Some(ActionOutcome::CoolingDown { remaining_secs });
        }
        None
    }

    fn transition(&mut self, to: ScanState) {
        let from = self.session.state;
        self.session.state = to;
        tracing::info!(%from, %to, queued = self.queue.len(), "Scan state changed");
    }

    fn dispatch_next(&mut self) {
        match self.queue.dequeue_next() {
            Some(image) => self.begin(image),
            None => {
                tracing::info!("Queue drained");
                self.session.clear_outcome();
                self.transition(ScanState::Idle);
            }
        }
    }

    /// Preprocess `image` and put it in flight. An unusable image returns the
    /// session to idle with an error and is not retried.
    fn begin(&mut self, image: RawImage) {
        self.session.clear_outcome();

        let payload = match preprocess::preprocess(&image, &self.config.preprocess) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(image = %image.label, error = %e, "Image discarded");
                self.session.error = Some(e.to_string());
                self.transition(ScanState::Idle);
                return;
            }
        };

        self.session.steps = self
            .config
            .stages
            .iter()
            .map(AnalysisStep::pending)
            .collect();
        self.session.current_image = Some(payload.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        self.progress_rx = Some(rx);
        pipeline::spawn_analysis(
            Arc::clone(&self.service),
            payload,
            self.config.stages.clone(),
            tx,
        );

        tracing::info!(image = %image.label, "Analysis dispatched");
        self.transition(ScanState::Analyzing);
    }

    fn apply(&mut self, msg: ScanProgress) {
        match msg {
            ScanProgress::StepStarted { index } => {
                for (i, step) in self.session.steps.iter_mut().enumerate() {
                    if i < index {
                        step.advance(StepStatus::Complete);
                    } else if i == index {
                        step.advance(StepStatus::InProgress);
                    }
                }
                if let Some(step) = self.session.steps.get(index) {
                    tracing::debug!(index, title = %step.title, "Analysis step started");
                }
            }
            ScanProgress::StepCompleted { index } => {
                if let Some(step) = self.session.steps.get_mut(index) {
                    step.advance(StepStatus::Complete);
                }
            }
            ScanProgress::Finished { outcome } => self.finish(outcome),
        }
    }

    /// Land the in-flight session in `results`, arm the cooldown, and record it.
    fn finish(&mut self, outcome: Result<UnifiedAnalysisResult, AnalysisError>) {
        self.progress_rx = None;

        let now = self.clock.now();
        match outcome {
            Ok(raw) => {
                let scan = reconcile::reconcile(raw, now);
                self.session.scan_id = Some(scan.scan_id);
                self.session.scanned_at = Some(scan.timestamp);
                match scan.outcome {
                    ScanOutcome::Fatal { info } => {
                        self.session.error = info.error.clone();
                        self.session.medicine_info = Some(info);
                        self.session.forensic_result = None;
                    }
                    ScanOutcome::SuccessOrWarning {
                        info,
                        forensic,
                        warning,
                    } => {
                        self.session.medicine_info = Some(info);
                        self.session.forensic_result = Some(forensic);
                        self.session.warning = warning;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Analysis failed");
                self.session.scan_id = Some(Uuid::new_v4());
                self.session.scanned_at = Some(now);
                self.session.error = Some(e.to_string());
            }
        }

        for step in &mut self.session.steps {
            step.advance(StepStatus::Complete);
        }

        self.record_history();
        self.transition(ScanState::Results);
        self.cooldown.arm();
    }

    fn record_history(&mut self) {
        let (Some(scan_id), Some(timestamp)) = (self.session.scan_id, self.session.scanned_at)
        else {
            return;
        };
        let forensic = self.session.forensic_result.as_ref();
        self.history.push(ScanRecord {
            scan_id,
            timestamp,
            image: self
                .session
                .current_image
                .as_ref()
                .map(|img| img.label.clone())
                .unwrap_or_default(),
            verdict: forensic.map(|f| f.verdict),
            score: forensic.map(|f| f.score),
            error: self.session.error.clone(),
            warning: self.session.warning.clone(),
        });
        if self.history.len() > constants::MAX_HISTORY {
            self.history.remove(0);
        }
    }
}

fn task_vanished() -> AnalysisError {
    AnalysisError::Rejected {
        reason: "analysis task ended without a result".to_string(),
    }
}

// =============================================================================
// Unit tests
// =============================================================================
