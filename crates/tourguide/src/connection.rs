//! Detects whether the user dragged a connection between two pins.
//!
//! The drag happens outside the tour's direct control, so success is
//! inferred from two independently armed observation paths: the pointer
//! sequence (down on the source pin, up somewhere) and the appearance of a
//! connection artifact on the surface. Whichever path resolves first drives
//! the sequencer; the sequencer's epoch guard makes the race advance the
//! tour at most once.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::selector::Selector;
use crate::step::StepTarget;
use crate::surface::{PointerEvent, UiSurface};

/// Sink through which armed watchers request step transitions.
///
/// Implementations must treat a stale epoch as a no-op; watchers may fire
/// after the step that armed them has been left.
pub trait AdvanceSink: Send + Sync {
    fn advance(&self, epoch: u64, target: StepTarget);
}

/// How long after a pointer-down the step advances optimistically, on the
/// assumption the user is mid-drag.
const OPTIMISTIC_ADVANCE_DELAY: Duration = Duration::from_millis(100);

/// Grace window after a pointer-up outside the target pin before the
/// attempt is declared abandoned.
const RELEASE_GRACE: Duration = Duration::from_millis(200);

/// Phases of a pointer-drag connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragPhase {
    Idle,
    Dragging,
    Succeeded,
    Abandoned,
}

/// Observes pointer interaction to infer the outcome of a drag-a-connection
/// step. One watcher instance is shared across the two connection steps; the
/// phase survives the transition between them (the user is still mid-drag
/// when the optimistic advance fires).
pub struct ConnectionWatcher {
    surface: Arc<dyn UiSurface>,
    phase: Arc<Mutex<DragPhase>>,
}

impl ConnectionWatcher {
    pub fn new(surface: Arc<dyn UiSurface>) -> Self {
        Self {
            surface,
            phase: Arc::new(Mutex::new(DragPhase::Idle)),
        }
    }

    pub fn phase(&self) -> DragPhase {
        self.phase.lock().map(|p| *p).unwrap_or(DragPhase::Idle)
    }

    /// Reset to [`DragPhase::Idle`]. Called when the source-pin step is
    /// (re-)entered, so a revisit after a failed attempt starts clean.
    pub fn reset(&self) {
        if let Ok(mut phase) = self.phase.lock() {
            *phase = DragPhase::Idle;
        }
    }

    fn set_phase(&self, next: DragPhase) {
        if let Ok(mut phase) = self.phase.lock() {
            debug!(from = ?*phase, to = ?next, "drag phase");
            *phase = next;
        }
    }

    /// Arm the pointer-down path: a down event on the source pin moves the
    /// phase to `Dragging` and starts the optimistic-advance timer. If the
    /// drag is still in progress when the timer fires, the sink is asked to
    /// advance; a stale epoch makes that a no-op.
    pub fn arm_drag_start(
        self: &Arc<Self>,
        source: Selector,
        sink: Arc<dyn AdvanceSink>,
        epoch: u64,
        token: CancellationToken,
    ) {
        let watcher = Arc::clone(self);
        let mut events = self.surface.pointer_events();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => event,
                };
                match event {
                    Ok(PointerEvent::Down {
                        target: Some(target),
                        ..
                    }) => {
                        let on_source = watcher
                            .surface
                            .query(&source)
                            .is_some_and(|el| el.key == target);
                        if !on_source {
                            continue;
                        }
                        watcher.set_phase(DragPhase::Dragging);
                        let watcher = Arc::clone(&watcher);
                        let sink = Arc::clone(&sink);
                        let token = token.clone();
                        tokio::spawn(async move {
                            tokio::select! {
                                _ = token.cancelled() => {}
                                _ = tokio::time::sleep(OPTIMISTIC_ADVANCE_DELAY) => {
                                    if watcher.phase() == DragPhase::Dragging {
                                        sink.advance(epoch, StepTarget::Next);
                                    }
                                }
                            }
                        });
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "pointer event stream lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    /// Arm the pointer-up path: a release outside the target pin's bounds,
    /// with no connection artifact appearing within the grace window, marks
    /// the attempt abandoned and routes the tour to the recovery step. A
    /// release inside the target falls through as an implicit success; the
    /// independently armed artifact poll confirms it.
    pub fn arm_drag_drop(
        self: &Arc<Self>,
        target: Selector,
        artifact: Selector,
        recovery: StepTarget,
        sink: Arc<dyn AdvanceSink>,
        epoch: u64,
        token: CancellationToken,
    ) {
        let watcher = Arc::clone(self);
        let mut events = self.surface.pointer_events();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => event,
                };
                match event {
                    Ok(PointerEvent::Up { x, y, .. }) => {
                        let released_inside = watcher
                            .surface
                            .query(&target)
                            .is_some_and(|el| el.contains_point(x, y));
                        if released_inside {
                            watcher.set_phase(DragPhase::Succeeded);
                            continue;
                        }
                        // Released elsewhere: give the surface a moment to
                        // materialize the edge before declaring failure.
                        let watcher = Arc::clone(&watcher);
                        let artifact = artifact.clone();
                        let recovery = recovery.clone();
                        let sink = Arc::clone(&sink);
                        let token = token.clone();
                        tokio::spawn(async move {
                            tokio::select! {
                                _ = token.cancelled() => {}
                                _ = tokio::time::sleep(RELEASE_GRACE) => {
                                    if watcher.surface.query(&artifact).is_none() {
                                        watcher.set_phase(DragPhase::Abandoned);
                                        sink.advance(epoch, recovery);
                                    }
                                }
                            }
                        });
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "pointer event stream lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }
}
