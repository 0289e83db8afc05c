//! Shims to the embedding application: canvas and popover callbacks, the
//! presentation library, analytics, and the outcome store.
//!
//! Everything here is fire-and-forget from the engine's point of view; a
//! host that wires these to no-ops gets a tour that still runs, with its
//! own UI state possibly desynced.

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::step::StepView;

/// Callbacks the embedding application provides when starting a walkthrough.
#[derive(Clone)]
pub struct HostBindings {
    empty_node_list: Arc<dyn Fn(bool) -> bool + Send + Sync>,
    set_pin_blocks_popover: Arc<dyn Fn(bool) + Send + Sync>,
    set_pin_save_popover: Arc<dyn Fn(bool) + Send + Sync>,
}

impl HostBindings {
    pub fn new(
        empty_node_list: impl Fn(bool) -> bool + Send + Sync + 'static,
        set_pin_blocks_popover: impl Fn(bool) + Send + Sync + 'static,
        set_pin_save_popover: impl Fn(bool) + Send + Sync + 'static,
    ) -> Self {
        Self {
            empty_node_list: Arc::new(empty_node_list),
            set_pin_blocks_popover: Arc::new(set_pin_blocks_popover),
            set_pin_save_popover: Arc::new(set_pin_save_popover),
        }
    }

    /// Query (`force == false`) or force-clear (`force == true`) the editor
    /// canvas. Returns whether the canvas is empty.
    pub fn empty_node_list(&self, force: bool) -> bool {
        (self.empty_node_list)(force)
    }

    pub fn set_pin_blocks_popover(&self, pinned: bool) {
        (self.set_pin_blocks_popover)(pinned)
    }

    pub fn set_pin_save_popover(&self, pinned: bool) {
        (self.set_pin_save_popover)(pinned)
    }
}

impl fmt::Debug for HostBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBindings").finish_non_exhaustive()
    }
}

/// The tour-rendering library, behind a narrow interface: it draws step
/// popovers and the modal overlay, and wires button presses back to the
/// tour handle.
#[async_trait]
pub trait TourPresenter: Send + Sync {
    /// Render a step's popover, anchored per the view.
    async fn show_step(&self, view: StepView);

    /// Show or hide the modal overlay dimming the rest of the UI.
    async fn set_overlay(&self, visible: bool);

    /// Tear down any visible tour UI. Called on both terminal transitions.
    async fn dismiss(&self);
}

/// Analytics event action emitted once per step shown.
pub const STEP_SHOWN_ACTION: &str = "tutorial_step_shown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub category: String,
    pub action: String,
    pub payload: serde_json::Value,
}

impl AnalyticsEvent {
    pub fn step_shown(step_id: &str) -> Self {
        Self {
            category: "event".to_string(),
            action: STEP_SHOWN_ACTION.to_string(),
            payload: json!({ "value": step_id }),
        }
    }
}

/// Analytics transport. Implementations must not block: emit is called on
/// the transition path and the engine never awaits delivery.
pub trait Analytics: Send + Sync {
    fn emit(&self, event: AnalyticsEvent);
}

/// Emits events through `tracing`; stands in when no transport is wired.
#[derive(Debug, Default)]
pub struct LogAnalytics;

impl Analytics for LogAnalytics {
    fn emit(&self, event: AnalyticsEvent) {
        debug!(
            category = %event.category,
            action = %event.action,
            payload = %event.payload,
            "analytics event"
        );
    }
}

/// Whether analytics emission is disabled for this process.
///
/// Users can opt out by setting TOURGUIDE_ANALYTICS_DISABLED=true.
pub fn analytics_disabled() -> bool {
    static DISABLED: OnceCell<bool> = OnceCell::new();
    *DISABLED.get_or_init(|| {
        std::env::var("TOURGUIDE_ANALYTICS_DISABLED")
            .unwrap_or_default()
            .eq_ignore_ascii_case("true")
    })
}

/// Storage key under which the walkthrough outcome is persisted.
pub const OUTCOME_KEY: &str = "onboarding-tour";

/// Terminal outcome of a walkthrough, persisted under [`OUTCOME_KEY`].
/// These are the only values the engine ever writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TourOutcome {
    Skipped,
    Completed,
    Canceled,
}

impl TourOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TourOutcome::Skipped => "skipped",
            TourOutcome::Completed => "completed",
            TourOutcome::Canceled => "canceled",
        }
    }
}

/// Durable key-value store for the final outcome marker. Writes overwrite
/// any previous value; the engine records at most one outcome per tour.
pub trait OutcomeStore: Send + Sync {
    fn record(&self, outcome: TourOutcome);
}

/// In-memory store, for tests and hosts without durable storage.
#[derive(Debug, Default)]
pub struct InMemoryOutcomeStore {
    value: Mutex<Option<TourOutcome>>,
}

impl InMemoryOutcomeStore {
    pub fn get(&self) -> Option<TourOutcome> {
        self.value.lock().ok().and_then(|v| *v)
    }
}

impl OutcomeStore for InMemoryOutcomeStore {
    fn record(&self, outcome: TourOutcome) {
        if let Ok(mut value) = self.value.lock() {
            debug!(key = OUTCOME_KEY, outcome = outcome.as_str(), "outcome recorded");
            *value = Some(outcome);
        }
    }
}
