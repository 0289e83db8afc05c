//! Guided onboarding walkthroughs over a node-editor UI.
//!
//! This crate sequences a fixed series of instructional steps, each anchored
//! to an element of the host's editor surface. Steps advance automatically
//! on observed user actions (clicks, drags, elements appearing) or manually
//! via navigation buttons; transient UI side effects (palette restriction,
//! popover pinning, the modal overlay) are applied on step entry and
//! reverted deterministically on every exit path.
//!
//! The host supplies the environment through narrow interfaces: a
//! [`UiSurface`] over its element tree, a [`TourPresenter`] for rendering,
//! the canvas/popover callbacks in [`HostBindings`], and the [`Analytics`]
//! and [`OutcomeStore`] shims. Nothing in the engine touches a real UI tree,
//! so the whole tour runs against fakes in tests.

pub mod connection;
pub mod errors;
pub mod host;
pub mod selector;
pub mod sequencer;
pub mod step;
pub mod surface;
#[cfg(test)]
mod tests;
pub mod visual_state;
pub mod waiter;
pub mod walkthrough;

pub use connection::{AdvanceSink, ConnectionWatcher, DragPhase};
pub use errors::TourError;
pub use host::{
    Analytics, AnalyticsEvent, HostBindings, InMemoryOutcomeStore, LogAnalytics, OutcomeStore,
    TourOutcome, TourPresenter, OUTCOME_KEY, STEP_SHOWN_ACTION,
};
pub use selector::Selector;
pub use sequencer::{Tour, TourConfig, TourDeps};
pub use step::{
    AdvanceTrigger, Anchor, AnchorSide, AnchorView, ButtonAction, ButtonView, Precondition, Step,
    StepButton, StepEffect, StepTarget, StepView,
};
pub use surface::{resolve_selector, Marking, PointerEvent, UiElement, UiElementAttributes, UiSurface};
pub use tokio_util::sync::CancellationToken;
pub use visual_state::VisualStateRegistry;
pub use waiter::ConditionWaiter;
pub use walkthrough::{builder_steps, start_builder_walkthrough, PALETTE_POOL};
