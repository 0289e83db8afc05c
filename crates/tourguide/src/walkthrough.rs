//! The builder onboarding walkthrough: the fixed step catalog and the
//! entry point hosts call to run it.

use std::sync::Arc;

use tracing::{instrument, warn};

use crate::selector::Selector;
use crate::sequencer::{Tour, TourDeps};
use crate::step::{AnchorSide, ButtonAction, Step, StepEffect, StepTarget};

/// Selector for the whole block palette; the restrict effect operates over
/// this population.
pub const PALETTE_POOL: &str = "id^:block-card-";

const CALCULATOR_CARD: &str = "id:block-card-b1ab9b19-67a6-406d-abf5-2dba76d00c79";
const RUN_BUTTON: &str = "testid:primary-action-run-agent";
const FIRST_NODE_OUTPUT_PIN: &str = "testid^:rf__node- >> nth:0 >> id$:-result-source";
const SECOND_NODE: &str = "testid^:rf__node- >> nth:1";
const SECOND_NODE_INPUT_PIN: &str = "testid^:rf__node- >> nth:1 >> id$:-a-target";
const EDGE_ARTIFACT: &str = "testid^:rf__edge-";

const CAUTION_TEXT: &str =
    "Caution: Clicking next will start a tutorial and will clear the current flow.";

/// The fixed step sequence of the builder walkthrough.
///
/// `canvas_empty` decides whether the opening step warns that proceeding
/// clears the current flow.
pub fn builder_steps(canvas_empty: bool) -> Vec<Step> {
    let welcome_body = if canvas_empty {
        "This is the builder!".to_string()
    } else {
        format!("This is the builder!\n\n{CAUTION_TEXT}")
    };

    vec![
        Step::new("starting-step", "Welcome to the Tutorial", welcome_body)
            .button("Skip Tutorial", ButtonAction::Skip)
            .button("Next", ButtonAction::ClearCanvasAndNext),
        Step::new(
            "open-block-step",
            "Open Blocks Menu",
            "Please click the block button to open the blocks menu.",
        )
        .anchor("id:blocks-control-popover-trigger", AnchorSide::Right)
        .advance_on_click("id:blocks-control-popover-trigger"),
        Step::new(
            "scroll-block-menu",
            "Scroll Down or Search",
            "Scroll down or search in the blocks menu for the \"Calculator Block\" and press the block to add it.",
        )
        .anchor("id:blocks-control-popover-content", AnchorSide::Right)
        .precondition("id:blocks-control-popover-content")
        .effect(StepEffect::RestrictPalette {
            target: Selector::from(CALCULATOR_CARD),
        })
        .effect(StepEffect::PinBlocksPopover)
        .advance_on_click(CALCULATOR_CARD),
        Step::new(
            "focus-new-block",
            "New Block",
            "This is the Calculator Block! Let's go over how it works.",
        )
        .anchor("id:custom-node-1", AnchorSide::Left)
        .precondition("id:custom-node-1")
        .effect(StepEffect::FitView { delay_ms: 100 })
        .button("Next", ButtonAction::Next),
        Step::new(
            "input-to-block",
            "Input to the Block",
            "This is the input pin for the block. You can input the output of other blocks here; this block takes numbers as input.",
        )
        .anchor("attr:nodeid=1", AnchorSide::Left)
        .button("Back", ButtonAction::Back)
        .button("Next", ButtonAction::Next),
        Step::new(
            "output-from-block",
            "Output from the Block",
            "This is the output pin for the block. You can connect this to another block to pass the output along.",
        )
        .anchor("attr:handlepos=right", AnchorSide::Right)
        .button("Back", ButtonAction::Back)
        .button("Next", ButtonAction::Next),
        Step::new(
            "select-operation-and-input",
            "Select Operation and Input Numbers",
            "Select any mathematical operation you'd like to perform, and enter numbers in both input fields.",
        )
        .anchor("id:input-handles", AnchorSide::Right)
        .button("Back", ButtonAction::Back)
        .button("Next", ButtonAction::Next),
        Step::new(
            "press-initial-save-button",
            "Press Save",
            "First we need to save the flow before we can run it!",
        )
        .anchor("id:save-control-popover-trigger", AnchorSide::Left)
        .advance_on_click("id:save-control-popover-trigger")
        .button("Back", ButtonAction::Back),
        Step::new(
            "save-agent-details",
            "Save the Agent",
            "Enter a name for your agent, add an optional description, and then click 'Save agent' to save your flow.",
        )
        .anchor("id:save-control-popover-content", AnchorSide::Top)
        .precondition("id:save-control-popover-content")
        .effect(StepEffect::PinSavePopover)
        .advance_on_click("id:save-control-save-agent"),
        Step::new(
            "press-run",
            "Press Run",
            "Start your first flow by pressing the Run button!",
        )
        .anchor(RUN_BUTTON, AnchorSide::Top)
        .precondition(RUN_BUTTON)
        .advance_on_click(RUN_BUTTON),
        Step::new(
            "wait-for-processing",
            "Processing",
            "Let's wait for the block to finish being processed...",
        )
        .anchor("id^:badge- && id$:-QUEUED", AnchorSide::Bottom)
        .precondition("id^:badge- && id$:-QUEUED")
        .effect(StepEffect::FitView { delay_ms: 0 })
        .effect(StepEffect::AdvanceWhenPresent {
            selector: Selector::from("id^:badge- && id$:-COMPLETED"),
            to: StepTarget::Next,
        }),
        Step::new(
            "check-output",
            "Check the Output",
            "Check here to see the output of the block after running the flow.",
        )
        .anchor("id:latest-output", AnchorSide::Top)
        .precondition_after("id:latest-output", 100)
        .effect(StepEffect::FitView { delay_ms: 0 })
        .button("Next", ButtonAction::Next),
        Step::new(
            "copy-paste-block",
            "Copy and Paste the Block",
            "Let's duplicate this block. Click and hold the block with your mouse, then press Ctrl+C (Cmd+C on Mac) to copy and Ctrl+V (Cmd+V on Mac) to paste.",
        )
        .anchor("testid^:rf__node-", AnchorSide::Top)
        .effect(StepEffect::FitView { delay_ms: 0 })
        .effect(StepEffect::AdvanceWhenPresent {
            selector: Selector::from(SECOND_NODE),
            to: StepTarget::Next,
        })
        .button("Back", ButtonAction::Back),
        Step::new(
            "focus-second-block",
            "Focus on the New Block",
            "This is your copied Calculator Block. Now, let's move it to the side of the first block.",
        )
        .anchor(SECOND_NODE, AnchorSide::Top)
        .precondition(SECOND_NODE)
        .button("Next", ButtonAction::Next),
        Step::new(
            "connect-blocks-output",
            "Connect the Blocks: Output",
            "Now, let's connect the output of the first Calculator Block to the input of the second Calculator Block. Drag from the output pin of the first block to the input pin (A) of the second block.",
        )
        .anchor(FIRST_NODE_OUTPUT_PIN, AnchorSide::Bottom)
        .precondition(FIRST_NODE_OUTPUT_PIN)
        .effect(StepEffect::FitView { delay_ms: 0 })
        .effect(StepEffect::ShowOverlay)
        .effect(StepEffect::WatchDragStart {
            source: Selector::from(FIRST_NODE_OUTPUT_PIN),
        })
        .button("Back", ButtonAction::Back),
        Step::new(
            "connect-blocks-input",
            "Connect the Blocks: Input",
            "Now, connect the output to the input pin of the second block (A).",
        )
        .anchor(SECOND_NODE_INPUT_PIN, AnchorSide::Top)
        .precondition(SECOND_NODE_INPUT_PIN)
        .effect(StepEffect::ShowOverlay)
        .effect(StepEffect::AdvanceWhenPresent {
            selector: Selector::from(EDGE_ARTIFACT),
            to: StepTarget::Show("press-run-again".to_string()),
        })
        .effect(StepEffect::WatchDragDrop {
            target: Selector::from(SECOND_NODE_INPUT_PIN),
            artifact: Selector::from(EDGE_ARTIFACT),
            recovery: StepTarget::Show("connect-blocks-output".to_string()),
        }),
        Step::new(
            "press-run-again",
            "Press Run Again",
            "Now, press the Run button again to execute the flow with the new Calculator Block added!",
        )
        .anchor(RUN_BUTTON, AnchorSide::Top)
        .precondition(RUN_BUTTON)
        .advance_on_click(RUN_BUTTON),
        Step::new(
            "congratulations",
            "Congratulations!",
            "You have successfully created your first flow. Watch for the outputs in the blocks!",
        )
        .precondition("id:latest-output")
        .effect(StepEffect::HideOverlay)
        .button("Finish", ButtonAction::Finish),
    ]
}

/// Start the builder walkthrough. Queries the canvas state, builds the tour,
/// and activates its first step in the background; returns the handle so the
/// host can wire navigation buttons and cancel externally.
#[instrument(skip(deps))]
pub fn start_builder_walkthrough(deps: TourDeps) -> Arc<Tour> {
    let canvas_empty = deps.host.empty_node_list(false);
    let tour = Tour::new(
        builder_steps(canvas_empty),
        Selector::from(PALETTE_POOL),
        deps,
    );
    let handle = Arc::clone(&tour);
    tokio::spawn(async move {
        if let Err(err) = handle.start().await {
            warn!(%err, "walkthrough failed to start");
        }
    });
    tour
}
