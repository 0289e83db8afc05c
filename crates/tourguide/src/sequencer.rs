//! The step sequencer: owns the cursor, drives transitions, and keeps every
//! armed watcher honest through a transition epoch.
//!
//! Transition order for a move from step S to step D:
//! 1. D's precondition is resolved by a bounded, cancellable wait while S
//!    stays fully active; a stall leaves S untouched.
//! 2. The transition epoch is bumped, invalidating every trigger S armed.
//! 3. S's step token is canceled and S's effects are reverted in reverse
//!    order.
//! 4. D's effects are applied and its triggers armed under a fresh child
//!    token.
//! 5. D is presented and the step-shown analytics event is emitted.
//!
//! Armed triggers capture the epoch current at arm time and advance through
//! [`Tour::advance_if_current`]; a stale epoch is a logged no-op. The two
//! connection-detection paths race through this same gate, so the sequencer
//! advances at most once per transition no matter which fires first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::connection::{AdvanceSink, ConnectionWatcher};
use crate::errors::TourError;
use crate::host::{
    analytics_disabled, Analytics, AnalyticsEvent, HostBindings, OutcomeStore, TourOutcome,
    TourPresenter,
};
use crate::selector::Selector;
use crate::step::{AdvanceTrigger, ButtonAction, Step, StepEffect, StepTarget};
use crate::surface::{PointerEvent, UiSurface};
use crate::visual_state::VisualStateRegistry;
use crate::waiter::ConditionWaiter;

/// Upper bound on the appear-polls armed by [`StepEffect::AdvanceWhenPresent`].
/// Generous: these wait on host-side processing (a run finishing, a paste
/// landing), not on a mount that either happens quickly or not at all.
const AUTO_ADVANCE_TIMEOUT: Duration = Duration::from_secs(300);

/// Everything a tour needs from its environment.
pub struct TourDeps {
    pub surface: Arc<dyn UiSurface>,
    pub presenter: Arc<dyn TourPresenter>,
    pub host: HostBindings,
    pub analytics: Arc<dyn Analytics>,
    pub outcomes: Arc<dyn OutcomeStore>,
}

/// Tuning knobs for the tour's waits.
#[derive(Debug, Clone)]
pub struct TourConfig {
    /// Bound on precondition waits; a step whose anchor does not appear
    /// within this window is not entered and the tour stays put.
    pub wait_timeout: Duration,
    /// Interval between polls of the surface.
    pub poll_interval: Duration,
}

impl Default for TourConfig {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    NotStarted,
    Active(usize),
    Completed,
    Canceled,
}

struct TourState {
    cursor: Cursor,
    /// Child token owned by the active step; canceling it releases every
    /// wait and watcher the step armed.
    step_token: Option<CancellationToken>,
    /// Effects applied for the active step, reverted in reverse on exit.
    applied: Vec<StepEffect>,
}

/// An ordered sequence of steps plus a cursor. Created once per walkthrough
/// invocation, transitions linearly, and terminates in exactly one of
/// completed or canceled.
pub struct Tour {
    run_id: Uuid,
    steps: Vec<Step>,
    deps: TourDeps,
    waiter: ConditionWaiter,
    registry: VisualStateRegistry,
    connection: Arc<ConnectionWatcher>,
    state: Mutex<TourState>,
    epoch: AtomicU64,
    /// Tour-level token; canceling it aborts pending precondition waits and
    /// every still-armed watcher.
    cancel_root: CancellationToken,
}

impl Tour {
    /// Build a tour over a fixed step sequence. `palette_pool` selects the
    /// population the restrict effect operates on.
    pub fn new(steps: Vec<Step>, palette_pool: Selector, deps: TourDeps) -> Arc<Self> {
        Self::with_config(steps, palette_pool, deps, TourConfig::default())
    }

    pub fn with_config(
        steps: Vec<Step>,
        palette_pool: Selector,
        deps: TourDeps,
        config: TourConfig,
    ) -> Arc<Self> {
        let waiter = ConditionWaiter::new(Arc::clone(&deps.surface))
            .with_interval(config.poll_interval)
            .with_timeout(config.wait_timeout);
        let registry = VisualStateRegistry::new(Arc::clone(&deps.surface), palette_pool);
        let connection = Arc::new(ConnectionWatcher::new(Arc::clone(&deps.surface)));
        Arc::new(Self {
            run_id: Uuid::new_v4(),
            steps,
            deps,
            waiter,
            registry,
            connection,
            state: Mutex::new(TourState {
                cursor: Cursor::NotStarted,
                step_token: None,
                applied: Vec::new(),
            }),
            epoch: AtomicU64::new(0),
            cancel_root: CancellationToken::new(),
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Id of the currently shown step, if the tour is active.
    pub async fn current_step_id(&self) -> Option<String> {
        let state = self.state.lock().await;
        match state.cursor {
            Cursor::Active(index) => Some(self.steps[index].id.clone()),
            _ => None,
        }
    }

    /// Whether the tour has reached a terminal state.
    pub async fn is_terminal(&self) -> bool {
        let state = self.state.lock().await;
        matches!(state.cursor, Cursor::Completed | Cursor::Canceled)
    }

    /// Phase of the connection watcher, exposed for the host's debugging UI.
    pub fn drag_phase(&self) -> crate::connection::DragPhase {
        self.connection.phase()
    }

    /// Activate the first step. Callers must call this exactly once.
    #[instrument(skip(self), fields(run_id = %self.run_id))]
    pub async fn start(self: &Arc<Self>) -> Result<(), TourError> {
        {
            let state = self.state.lock().await;
            if state.cursor != Cursor::NotStarted {
                return Err(TourError::InvalidTransition(
                    "start called on a tour that already started".to_string(),
                ));
            }
        }
        info!(steps = self.steps.len(), "walkthrough starting");
        let epoch = self.epoch.load(Ordering::SeqCst);
        self.transition(0, epoch).await
    }

    /// Move the cursor one step forward. No-op past the last step.
    pub async fn next(self: &Arc<Self>) -> Result<(), TourError> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        self.advance_if_current(epoch, StepTarget::Next).await
    }

    /// Move the cursor one step back. No-op at the first step.
    pub async fn back(self: &Arc<Self>) -> Result<(), TourError> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        self.advance_if_current(epoch, StepTarget::Back).await
    }

    /// Force-show a step by id.
    pub async fn show(self: &Arc<Self>, id: &str) -> Result<(), TourError> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        self.advance_if_current(epoch, StepTarget::Show(id.to_string()))
            .await
    }

    /// Terminal transition recording the skipped outcome.
    pub async fn skip(self: &Arc<Self>) -> Result<(), TourError> {
        self.finish_with(TourOutcome::Skipped, Cursor::Canceled).await
    }

    /// Terminal transition from any non-terminal state; records canceled.
    pub async fn cancel(self: &Arc<Self>) -> Result<(), TourError> {
        self.finish_with(TourOutcome::Canceled, Cursor::Canceled).await
    }

    /// Terminal transition from the last step; records completed.
    pub async fn complete(self: &Arc<Self>) -> Result<(), TourError> {
        {
            let state = self.state.lock().await;
            match state.cursor {
                Cursor::Active(index) if index + 1 == self.steps.len() => {}
                Cursor::Completed | Cursor::Canceled => return Err(TourError::NotActive),
                _ => {
                    return Err(TourError::InvalidTransition(
                        "complete is only permitted from the last step".to_string(),
                    ))
                }
            }
        }
        self.finish_with(TourOutcome::Completed, Cursor::Completed)
            .await
    }

    /// Dispatch a navigation button press from the presenter.
    pub async fn handle_button(self: &Arc<Self>, action: ButtonAction) -> Result<(), TourError> {
        match action {
            ButtonAction::Next => self.next().await,
            ButtonAction::Back => self.back().await,
            ButtonAction::ClearCanvasAndNext => {
                self.deps.host.empty_node_list(true);
                self.next().await
            }
            ButtonAction::Skip => self.skip().await,
            ButtonAction::Finish => self.complete().await,
        }
    }

    /// Advance to `target` if the tour is still in the state that was
    /// current at `armed_epoch`. Stale requests are logged no-ops: this is
    /// the single gate through which every trigger, watcher, and navigation
    /// call moves the cursor, and the first writer wins.
    pub async fn advance_if_current(
        self: &Arc<Self>,
        armed_epoch: u64,
        target: StepTarget,
    ) -> Result<(), TourError> {
        let current = {
            let state = self.state.lock().await;
            if self.epoch.load(Ordering::SeqCst) != armed_epoch {
                debug!(?target, "stale advance ignored");
                return Ok(());
            }
            match state.cursor {
                Cursor::Completed | Cursor::Canceled => return Err(TourError::NotActive),
                Cursor::NotStarted => {
                    return Err(TourError::InvalidTransition(
                        "tour has not started".to_string(),
                    ))
                }
                Cursor::Active(index) => index,
            }
        };

        let index = match &target {
            StepTarget::Next => {
                if current + 1 >= self.steps.len() {
                    debug!("next past the last step ignored");
                    return Ok(());
                }
                current + 1
            }
            StepTarget::Back => {
                if current == 0 {
                    debug!("back past the first step ignored");
                    return Ok(());
                }
                current - 1
            }
            StepTarget::Show(id) => self
                .steps
                .iter()
                .position(|s| s.id == *id)
                .ok_or_else(|| TourError::UnknownStep(id.clone()))?,
        };

        self.transition(index, armed_epoch).await
    }

    /// The one transition path. `expected_epoch` is re-checked after the
    /// precondition wait; if another transition won the race in between,
    /// this one dissolves without side effects.
    #[instrument(level = "debug", skip(self), fields(run_id = %self.run_id))]
    async fn transition(self: &Arc<Self>, index: usize, expected_epoch: u64) -> Result<(), TourError> {
        let step = &self.steps[index];

        // Resolve the precondition while the current step stays active.
        if let Some(pre) = &step.precondition {
            if pre.initial_delay_ms > 0 {
                tokio::select! {
                    _ = self.cancel_root.cancelled() => return Err(TourError::NotActive),
                    _ = tokio::time::sleep(Duration::from_millis(pre.initial_delay_ms)) => {}
                }
            }
            match self.waiter.wait_for(&pre.selector, &self.cancel_root).await {
                Ok(_) => {}
                Err(TourError::Canceled(_)) => return Err(TourError::NotActive),
                Err(err) => {
                    warn!(step = %step.id, %err, "precondition not satisfied; staying on current step");
                    return Err(err);
                }
            }
        }

        let mut state = self.state.lock().await;
        if self.epoch.load(Ordering::SeqCst) != expected_epoch {
            debug!(step = %step.id, "transition superseded while waiting");
            return Ok(());
        }
        match state.cursor {
            Cursor::Completed | Cursor::Canceled => return Err(TourError::NotActive),
            _ => {}
        }

        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.leave_current(&mut state).await;
        self.enter_step(&mut state, index).await;
        Ok(())
    }

    /// Revert the active step: cancel its token, then undo its effects in
    /// reverse order. Safe to call when no step is active.
    async fn leave_current(&self, state: &mut TourState) {
        if let Some(token) = state.step_token.take() {
            token.cancel();
        }
        let applied = std::mem::take(&mut state.applied);
        for effect in applied.iter().rev() {
            self.revert_effect(effect).await;
        }
    }

    // Returns a boxed, explicitly-`Send` future rather than an `async fn`'s
    // opaque one. `apply_effect` can spawn a task that re-enters the transition
    // path (`advance_if_current` -> `transition` -> `enter_step`), and that
    // recursive cycle of opaque futures prevents the compiler from proving the
    // spawned task is `Send`. Declaring the `Send` bound here at a private node
    // cuts the inference cycle without changing behavior.
    fn enter_step<'a>(
        self: &'a Arc<Self>,
        state: &'a mut TourState,
        index: usize,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let step = self.steps[index].clone();
            let token = self.cancel_root.child_token();
            let epoch = self.epoch.load(Ordering::SeqCst);

            state.cursor = Cursor::Active(index);
            state.step_token = Some(token.clone());
            state.applied = step.effects.clone();

            for effect in &step.effects {
                self.apply_effect(effect, epoch, &token).await;
            }
            if let Some(AdvanceTrigger::OnClick { selector }) = &step.advance {
                self.arm_click_trigger(selector.clone(), epoch, token.clone());
            }

            self.deps.presenter.show_step(step.view()).await;
            info!(step = %step.id, index, "step shown");
            if !analytics_disabled() {
                self.deps.analytics.emit(AnalyticsEvent::step_shown(&step.id));
            }
        })
    }

    async fn apply_effect(self: &Arc<Self>, effect: &StepEffect, epoch: u64, token: &CancellationToken) {
        match effect {
            StepEffect::RestrictPalette { target } => self.registry.restrict_to(target),
            StepEffect::PinBlocksPopover => self.deps.host.set_pin_blocks_popover(true),
            StepEffect::PinSavePopover => self.deps.host.set_pin_save_popover(true),
            StepEffect::ShowOverlay => self.deps.presenter.set_overlay(true).await,
            StepEffect::HideOverlay => self.deps.presenter.set_overlay(false).await,
            StepEffect::FitView { delay_ms } => {
                if *delay_ms == 0 {
                    self.deps.surface.fit_view();
                } else {
                    let surface = Arc::clone(&self.deps.surface);
                    let token = token.clone();
                    let delay = Duration::from_millis(*delay_ms);
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = token.cancelled() => {}
                            _ = tokio::time::sleep(delay) => surface.fit_view(),
                        }
                    });
                }
            }
            StepEffect::AdvanceWhenPresent { selector, to } => {
                let tour = Arc::clone(self);
                let waiter = self.waiter.clone();
                let selector = selector.clone();
                let to = to.clone();
                let token = token.clone();
                tokio::spawn(async move {
                    match waiter
                        .wait_for_within(&selector, AUTO_ADVANCE_TIMEOUT, &token)
                        .await
                    {
                        Ok(_) => {
                            if let Err(err) = tour.advance_if_current(epoch, to).await {
                                debug!(%err, "appear-triggered advance refused");
                            }
                        }
                        Err(TourError::Canceled(_)) => {}
                        Err(err) => warn!(%err, "appear poll gave up"),
                    }
                });
            }
            StepEffect::WatchDragStart { source } => {
                // Revisiting the source-pin step starts a fresh attempt.
                self.connection.reset();
                self.connection.arm_drag_start(
                    source.clone(),
                    self.sink(),
                    epoch,
                    token.clone(),
                );
            }
            StepEffect::WatchDragDrop {
                target,
                artifact,
                recovery,
            } => {
                self.connection.arm_drag_drop(
                    target.clone(),
                    artifact.clone(),
                    recovery.clone(),
                    self.sink(),
                    epoch,
                    token.clone(),
                );
            }
        }
    }

    async fn revert_effect(&self, effect: &StepEffect) {
        match effect {
            StepEffect::RestrictPalette { .. } => self.registry.clear_all(),
            StepEffect::PinBlocksPopover => self.deps.host.set_pin_blocks_popover(false),
            StepEffect::PinSavePopover => self.deps.host.set_pin_save_popover(false),
            StepEffect::ShowOverlay => self.deps.presenter.set_overlay(false).await,
            StepEffect::HideOverlay => self.deps.presenter.set_overlay(true).await,
            // One-shot, or released through the step token.
            StepEffect::FitView { .. }
            | StepEffect::AdvanceWhenPresent { .. }
            | StepEffect::WatchDragStart { .. }
            | StepEffect::WatchDragDrop { .. } => {}
        }
    }

    fn arm_click_trigger(self: &Arc<Self>, selector: Selector, epoch: u64, token: CancellationToken) {
        let tour = Arc::clone(self);
        let mut events = self.deps.surface.pointer_events();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => event,
                };
                match event {
                    Ok(PointerEvent::Click { target }) => {
                        let on_target = tour
                            .deps
                            .surface
                            .query(&selector)
                            .is_some_and(|el| el.key == target);
                        if on_target {
                            if let Err(err) = tour.advance_if_current(epoch, StepTarget::Next).await
                            {
                                debug!(%err, "click-triggered advance refused");
                            }
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "pointer event stream lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    fn sink(self: &Arc<Self>) -> Arc<dyn AdvanceSink> {
        Arc::new(TourSink(Arc::downgrade(self)))
    }

    /// Both terminal transitions funnel here: revert the active step, unpin
    /// both popovers unconditionally, dismiss the presentation, and record
    /// the outcome exactly once.
    #[instrument(skip(self), fields(run_id = %self.run_id))]
    async fn finish_with(
        self: &Arc<Self>,
        outcome: TourOutcome,
        terminal: Cursor,
    ) -> Result<(), TourError> {
        let mut state = self.state.lock().await;
        if matches!(state.cursor, Cursor::Completed | Cursor::Canceled) {
            return Err(TourError::NotActive);
        }

        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.leave_current(&mut state).await;
        state.cursor = terminal;

        // Unpin both popovers on every terminal path, whether or not a
        // pinning step was active.
        self.deps.host.set_pin_blocks_popover(false);
        self.deps.host.set_pin_save_popover(false);

        self.cancel_root.cancel();
        self.deps.presenter.dismiss().await;
        self.deps.outcomes.record(outcome);
        info!(outcome = outcome.as_str(), "walkthrough finished");
        Ok(())
    }
}

/// Advance requests from armed watchers, holding the tour weakly so a
/// lingering watcher task cannot keep a finished tour alive.
struct TourSink(Weak<Tour>);

impl AdvanceSink for TourSink {
    fn advance(&self, epoch: u64, target: StepTarget) {
        if let Some(tour) = self.0.upgrade() {
            tokio::spawn(async move {
                if let Err(err) = tour.advance_if_current(epoch, target).await {
                    debug!(%err, "watcher advance refused");
                }
            });
        }
    }
}
