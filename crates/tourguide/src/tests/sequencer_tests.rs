use std::sync::Arc;
use std::time::Duration;

use super::fake::{elem, Harness};
use crate::errors::TourError;
use crate::host::TourOutcome;
use crate::selector::Selector;
use crate::sequencer::{Tour, TourConfig};
use crate::step::{ButtonAction, Step, StepEffect, StepTarget};
use crate::surface::Marking;
use crate::walkthrough::{builder_steps, PALETTE_POOL};

fn test_config() -> TourConfig {
    TourConfig {
        wait_timeout: Duration::from_millis(300),
        poll_interval: Duration::from_millis(10),
    }
}

fn plain(id: &str) -> Step {
    Step::new(id, id, "body")
        .button("Back", ButtonAction::Back)
        .button("Next", ButtonAction::Next)
}

fn tour_with(harness: &Harness, steps: Vec<Step>) -> Arc<Tour> {
    Tour::with_config(
        steps,
        Selector::from(PALETTE_POOL),
        harness.deps(),
        test_config(),
    )
}

/// Steps of the builder catalog, narrowed to the ids under test.
fn catalog_subset(ids: &[&str], canvas_empty: bool) -> Vec<Step> {
    builder_steps(canvas_empty)
        .into_iter()
        .filter(|s| ids.contains(&s.id.as_str()))
        .collect()
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// --- Scenario 1: non-empty canvas warns, Next clears and advances ---

#[tokio::test]
async fn starting_step_warns_and_clears_a_non_empty_canvas() {
    let harness = Harness::with_canvas_empty(false);
    let tour = tour_with(&harness, builder_steps(false));

    tour.start().await.expect("starting step has no precondition");
    let shown = harness.presenter.last_shown().expect("step shown");
    assert_eq!(shown.id, "starting-step");
    assert!(shown.body.contains("Caution"));

    tour.handle_button(ButtonAction::ClearCanvasAndNext)
        .await
        .expect("open-block-step has no precondition");

    assert_eq!(
        harness.force_clears.load(std::sync::atomic::Ordering::SeqCst),
        1
    );
    assert_eq!(
        harness.presenter.shown_ids(),
        vec!["starting-step", "open-block-step"]
    );
}

#[tokio::test]
async fn starting_step_omits_the_caution_when_the_canvas_is_empty() {
    let harness = Harness::with_canvas_empty(true);
    let tour = tour_with(&harness, builder_steps(true));

    tour.start().await.expect("start");
    let shown = harness.presenter.last_shown().expect("step shown");
    assert!(!shown.body.contains("Caution"));
}

// --- Scenario 2: choosing the calculator block restores the palette ---

#[tokio::test]
async fn choosing_the_block_advances_and_restores_the_palette() {
    let harness = Harness::new();
    let surface = &harness.surface;
    surface.add(elem("content").data_id("blocks-control-popover-content"));
    surface.add(elem("card-calc").data_id("block-card-b1ab9b19-67a6-406d-abf5-2dba76d00c79"));
    surface.add(elem("card-other").data_id("block-card-other"));
    surface.add(elem("node-1").data_id("custom-node-1"));

    let tour = tour_with(
        &harness,
        catalog_subset(&["scroll-block-menu", "focus-new-block"], true),
    );
    tour.start().await.expect("popover content is present");

    assert_eq!(surface.marking_of("card-calc"), Some(Marking::Emphasized));
    assert_eq!(surface.marking_of("card-other"), Some(Marking::Muted));
    assert_eq!(harness.journal_with_prefix("pin-blocks:"), vec!["pin-blocks:true"]);

    surface.click("card-calc");
    settle().await;

    assert_eq!(
        harness.presenter.shown_ids(),
        vec!["scroll-block-menu", "focus-new-block"]
    );
    assert_eq!(surface.marking_of("card-calc"), Some(Marking::Clear));
    assert_eq!(surface.marking_of("card-other"), Some(Marking::Clear));
    assert_eq!(
        harness.journal_with_prefix("pin-blocks:"),
        vec!["pin-blocks:true", "pin-blocks:false"]
    );

    // Exit hooks of the menu step run before the next step is presented.
    let journal = harness.journal.entries();
    let unpin = journal.iter().position(|e| e == "pin-blocks:false").unwrap();
    let cleared = journal
        .iter()
        .position(|e| e == "mark:card-other:Clear")
        .unwrap();
    let shown = journal.iter().position(|e| e == "show:focus-new-block").unwrap();
    assert!(unpin < shown);
    assert!(cleared < shown);
}

// --- Scenario 3: optimistic drag advance, then pointer-up recovery ---

fn connection_surface(harness: &Harness) {
    let surface = &harness.surface;
    surface.add(elem("node-1").test_id("rf__node-1"));
    surface.add(elem("node-2").test_id("rf__node-2"));
    surface.add(
        elem("source-pin")
            .data_id("1-result-source")
            .parent("node-1")
            .bounds(100.0, 100.0, 10.0, 10.0),
    );
    surface.add(
        elem("target-pin")
            .data_id("2-a-target")
            .parent("node-2")
            .bounds(200.0, 100.0, 10.0, 10.0),
    );
    surface.add(elem("run-button").test_id("primary-action-run-agent"));
}

const CONNECTION_STEPS: &[&str] = &[
    "connect-blocks-output",
    "connect-blocks-input",
    "press-run-again",
];

#[tokio::test]
async fn optimistic_advance_then_failed_release_routes_back() {
    let harness = Harness::new();
    connection_surface(&harness);
    let tour = tour_with(&harness, catalog_subset(CONNECTION_STEPS, true));

    tour.start().await.expect("source pin is present");
    assert_eq!(
        harness.presenter.last_shown().map(|v| v.id),
        Some("connect-blocks-output".to_string())
    );

    // Pointer-down with no pointer-up: mid-drag, advance optimistically.
    harness.surface.pointer_down(105.0, 105.0, Some("source-pin"));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        tour.current_step_id().await,
        Some("connect-blocks-input".to_string())
    );

    // Release far from the target pin; no edge ever appears.
    harness.surface.pointer_up(5.0, 5.0, None);
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(
        harness.presenter.shown_ids(),
        vec![
            "connect-blocks-output",
            "connect-blocks-input",
            "connect-blocks-output"
        ]
    );
    // The overlay was raised by each connection step and dropped on each
    // exit, including the recovery jump.
    assert_eq!(
        harness.presenter.overlay_history(),
        vec![true, false, true, false, true]
    );
}

#[tokio::test]
async fn edge_artifact_force_shows_the_run_step() {
    let harness = Harness::new();
    connection_surface(&harness);
    let tour = tour_with(&harness, catalog_subset(CONNECTION_STEPS, true));

    tour.start().await.expect("source pin is present");
    harness.surface.pointer_down(105.0, 105.0, Some("source-pin"));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        tour.current_step_id().await,
        Some("connect-blocks-input".to_string())
    );

    // The user completes the drop; the edge materializes and the artifact
    // poll advances regardless of pointer events.
    harness.surface.pointer_up(205.0, 105.0, Some("target-pin"));
    harness.surface.add(elem("edge-1").test_id("rf__edge-1"));
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(
        tour.current_step_id().await,
        Some("press-run-again".to_string())
    );
    // Exactly one transition out of the input step.
    assert_eq!(
        harness.presenter.shown_ids(),
        vec![
            "connect-blocks-output",
            "connect-blocks-input",
            "press-run-again"
        ]
    );
}

// --- Scenario 4: badge-driven auto-advance with no user action ---

#[tokio::test]
async fn queued_badge_step_advances_when_the_completed_badge_appears() {
    let harness = Harness::new();
    harness.surface.add(elem("badge-q").data_id("badge-1-QUEUED"));

    let tour = tour_with(
        &harness,
        catalog_subset(&["wait-for-processing", "check-output"], true),
    );
    tour.start().await.expect("queued badge is present");
    assert_eq!(
        tour.current_step_id().await,
        Some("wait-for-processing".to_string())
    );
    assert!(harness.surface.fit_view_count() >= 1);

    // No pointer events at all: the completed badge alone advances.
    harness.surface.add(elem("badge-c").data_id("badge-1-COMPLETED"));
    harness.surface.add(elem("out").data_id("latest-output"));
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(
        harness.presenter.shown_ids(),
        vec!["wait-for-processing", "check-output"]
    );
}

// --- Scenario 5: cancel persists once and unpins both popovers ---

#[tokio::test]
async fn cancel_records_once_and_unpins_both_popovers() {
    let harness = Harness::with_canvas_empty(true);
    let tour = tour_with(&harness, builder_steps(true));
    tour.start().await.expect("start");

    tour.cancel().await.expect("cancel from an active step");

    assert_eq!(harness.outcomes.written(), vec![TourOutcome::Canceled]);
    assert_eq!(harness.journal_with_prefix("pin-blocks:"), vec!["pin-blocks:false"]);
    assert_eq!(harness.journal_with_prefix("pin-save:"), vec!["pin-save:false"]);
    assert_eq!(harness.presenter.dismiss_count(), 1);

    // A second cancel is refused and records nothing further.
    assert!(matches!(tour.cancel().await, Err(TourError::NotActive)));
    assert_eq!(harness.outcomes.written(), vec![TourOutcome::Canceled]);
}

// --- Engine properties ---

#[tokio::test]
async fn duplicate_advance_from_the_same_epoch_moves_once() {
    let harness = Harness::new();
    let tour = tour_with(&harness, vec![plain("a"), plain("b"), plain("c")]);
    tour.start().await.expect("start");

    // Both detection paths of a race capture the epoch current when step
    // "a" was entered; the second request must dissolve.
    let armed_epoch = 1;
    tour.advance_if_current(armed_epoch, StepTarget::Next)
        .await
        .expect("first writer wins");
    tour.advance_if_current(armed_epoch, StepTarget::Next)
        .await
        .expect("stale writer is a no-op");

    assert_eq!(harness.presenter.shown_ids(), vec!["a", "b"]);
    assert_eq!(tour.current_step_id().await, Some("b".to_string()));
}

#[tokio::test]
async fn terminal_states_refuse_navigation() {
    let harness = Harness::new();
    let tour = tour_with(&harness, vec![plain("a"), plain("b")]);
    tour.start().await.expect("start");
    tour.cancel().await.expect("cancel");

    assert!(matches!(tour.next().await, Err(TourError::NotActive)));
    assert!(matches!(tour.back().await, Err(TourError::NotActive)));
    assert_eq!(tour.current_step_id().await, None);
    assert!(tour.is_terminal().await);
    assert_eq!(harness.presenter.shown_ids(), vec!["a"]);
}

#[tokio::test]
async fn restrict_window_closes_on_back_and_on_cancel() {
    let harness = Harness::new();
    harness.surface.add(elem("card-1").data_id("block-card-1"));
    harness.surface.add(elem("card-2").data_id("block-card-2"));

    let restricted = Step::new("menu", "menu", "body")
        .effect(StepEffect::RestrictPalette {
            target: Selector::from("id:block-card-1"),
        })
        .button("Back", ButtonAction::Back)
        .button("Next", ButtonAction::Next);
    let tour = tour_with(&harness, vec![plain("a"), restricted, plain("c")]);
    tour.start().await.expect("start");

    tour.next().await.expect("enter the restricting step");
    assert_eq!(harness.surface.marking_of("card-2"), Some(Marking::Muted));

    tour.back().await.expect("leave it backwards");
    assert_eq!(harness.surface.marking_of("card-2"), Some(Marking::Clear));

    tour.next().await.expect("re-enter");
    assert_eq!(harness.surface.marking_of("card-2"), Some(Marking::Muted));

    tour.cancel().await.expect("cancel while restricted");
    assert_eq!(harness.surface.marking_of("card-2"), Some(Marking::Clear));
}

#[tokio::test]
async fn unsatisfied_precondition_stalls_on_the_current_step() {
    let harness = Harness::new();
    let gated = Step::new("gated", "gated", "body").precondition("id:appears-later");
    let tour = tour_with(&harness, vec![plain("a"), gated]);
    tour.start().await.expect("start");

    let err = tour.next().await.expect_err("anchor never appears");
    assert!(matches!(err, TourError::Timeout { .. }));
    assert_eq!(tour.current_step_id().await, Some("a".to_string()));

    // Once the anchor exists the same navigation succeeds.
    harness.surface.add(elem("late").data_id("appears-later"));
    tour.next().await.expect("anchor is present now");
    assert_eq!(tour.current_step_id().await, Some("gated".to_string()));
}

#[tokio::test]
async fn start_is_single_shot() {
    let harness = Harness::new();
    let tour = tour_with(&harness, vec![plain("a")]);
    tour.start().await.expect("first start");
    assert!(matches!(
        tour.start().await,
        Err(TourError::InvalidTransition(_))
    ));
    assert_eq!(harness.presenter.shown_ids(), vec!["a"]);
}

#[tokio::test]
async fn complete_is_only_permitted_from_the_last_step() {
    let harness = Harness::new();
    let tour = tour_with(&harness, vec![plain("a"), plain("b")]);
    tour.start().await.expect("start");

    assert!(matches!(
        tour.complete().await,
        Err(TourError::InvalidTransition(_))
    ));

    tour.next().await.expect("to the last step");
    tour.complete().await.expect("complete from the last step");

    assert_eq!(harness.outcomes.written(), vec![TourOutcome::Completed]);
    assert_eq!(harness.presenter.dismiss_count(), 1);
}

#[tokio::test]
async fn skip_records_the_skipped_outcome() {
    let harness = Harness::new();
    let tour = tour_with(&harness, vec![plain("a"), plain("b")]);
    tour.start().await.expect("start");
    tour.handle_button(ButtonAction::Skip).await.expect("skip");

    assert_eq!(harness.outcomes.written(), vec![TourOutcome::Skipped]);
    assert!(tour.is_terminal().await);
}

#[tokio::test]
async fn every_show_emits_one_analytics_event_including_reshows() {
    let harness = Harness::new();
    let tour = tour_with(&harness, vec![plain("a"), plain("b")]);
    tour.start().await.expect("start");
    tour.next().await.expect("forward");
    tour.back().await.expect("and back");

    assert_eq!(harness.analytics.shown_values(), vec!["a", "b", "a"]);
    let first = &harness.analytics.events()[0];
    assert_eq!(first.category, "event");
    assert_eq!(first.action, "tutorial_step_shown");
    assert_eq!(harness.presenter.shown_ids(), vec!["a", "b", "a"]);
}

#[tokio::test]
async fn boundary_navigation_is_a_no_op() {
    let harness = Harness::new();
    let tour = tour_with(&harness, vec![plain("a"), plain("b")]);
    tour.start().await.expect("start");

    tour.back().await.expect("back at the first step is ignored");
    assert_eq!(tour.current_step_id().await, Some("a".to_string()));

    tour.next().await.expect("forward");
    tour.next().await.expect("next at the last step is ignored");
    assert_eq!(tour.current_step_id().await, Some("b".to_string()));
    assert_eq!(harness.presenter.shown_ids(), vec!["a", "b"]);
}
