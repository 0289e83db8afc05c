//! Step definitions: a fixed record type per step, with structurally paired
//! entry/exit effects.
//!
//! A step's side effects are data, not ad hoc hooks: every [`StepEffect`]
//! variant knows both how it is applied on entry and how it is reverted on
//! exit, and the sequencer reverts all applied effects in reverse order on
//! every exit path. That makes the restrict/clear and pin/unpin pairing a
//! property of the type rather than a calling convention.

use serde::{Deserialize, Serialize};

use crate::selector::Selector;

/// Where an engine-initiated advancement should land.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepTarget {
    /// One step forward from the step that armed the trigger.
    Next,
    /// One step backward.
    Back,
    /// Jump to a named step (the connection-failure recovery path).
    Show(String),
}

/// Which side of its anchor a step's popover prefers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorSide {
    Top,
    Bottom,
    Left,
    Right,
}

/// A step's anchor on the editor surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Anchor {
    pub selector: Selector,
    pub side: AnchorSide,
}

/// Actions offered as navigation buttons on a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonAction {
    Back,
    Next,
    /// Clear the editor canvas through the host, then advance.
    ClearCanvasAndNext,
    /// Leave the tour, recording the skipped outcome.
    Skip,
    /// Finish the tour from its last step.
    Finish,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepButton {
    pub label: String,
    pub action: ButtonAction,
}

/// A side effect applied when a step is entered and reverted when it is
/// left, by any path.
#[derive(Debug, Clone, PartialEq)]
pub enum StepEffect {
    /// Restrict the block palette to the target card; revert clears all
    /// markings.
    RestrictPalette { target: Selector },
    /// Keep the blocks popover pinned open while the step is active.
    PinBlocksPopover,
    /// Keep the save popover pinned open while the step is active.
    PinSavePopover,
    /// Show the modal overlay while the step is active.
    ShowOverlay,
    /// Drop the modal overlay for this step; revert restores it.
    HideOverlay,
    /// One-shot viewport fit after a delay; nothing to revert.
    FitView { delay_ms: u64 },
    /// Poll for an element and force-show a step once it appears; revert
    /// cancels the poll.
    AdvanceWhenPresent { selector: Selector, to: StepTarget },
    /// Arm the connection watcher's pointer-down path on the source anchor.
    WatchDragStart { source: Selector },
    /// Arm the connection watcher's pointer-up failure path.
    WatchDragDrop {
        target: Selector,
        artifact: Selector,
        recovery: StepTarget,
    },
}

/// User action that advances the step without a button press.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceTrigger {
    /// Advance one step forward when an element matching the selector is
    /// clicked.
    OnClick { selector: Selector },
}

/// A precondition gate: the step is not entered until the selector matches.
#[derive(Debug, Clone, PartialEq)]
pub struct Precondition {
    pub selector: Selector,
    /// Delay before the first poll, for anchors that remount shortly after
    /// the triggering action.
    pub initial_delay_ms: u64,
}

/// One step of a walkthrough. Immutable once defined; the sequence of steps
/// is fixed at construction.
#[derive(Debug, Clone)]
pub struct Step {
    pub id: String,
    pub title: String,
    pub body: String,
    pub anchor: Option<Anchor>,
    pub precondition: Option<Precondition>,
    pub effects: Vec<StepEffect>,
    pub advance: Option<AdvanceTrigger>,
    pub buttons: Vec<StepButton>,
}

impl Step {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            anchor: None,
            precondition: None,
            effects: Vec::new(),
            advance: None,
            buttons: Vec::new(),
        }
    }

    pub fn anchor(mut self, selector: impl Into<Selector>, side: AnchorSide) -> Self {
        self.anchor = Some(Anchor {
            selector: selector.into(),
            side,
        });
        self
    }

    pub fn precondition(mut self, selector: impl Into<Selector>) -> Self {
        self.precondition = Some(Precondition {
            selector: selector.into(),
            initial_delay_ms: 0,
        });
        self
    }

    pub fn precondition_after(mut self, selector: impl Into<Selector>, delay_ms: u64) -> Self {
        self.precondition = Some(Precondition {
            selector: selector.into(),
            initial_delay_ms: delay_ms,
        });
        self
    }

    pub fn effect(mut self, effect: StepEffect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn advance_on_click(mut self, selector: impl Into<Selector>) -> Self {
        self.advance = Some(AdvanceTrigger::OnClick {
            selector: selector.into(),
        });
        self
    }

    pub fn button(mut self, label: impl Into<String>, action: ButtonAction) -> Self {
        self.buttons.push(StepButton {
            label: label.into(),
            action,
        });
        self
    }

    /// The presentation-facing view of this step.
    pub fn view(&self) -> StepView {
        StepView {
            id: self.id.clone(),
            title: self.title.clone(),
            body: self.body.clone(),
            anchor: self.anchor.as_ref().map(|a| AnchorView {
                selector: a.selector.to_string(),
                side: a.side,
            }),
            buttons: self
                .buttons
                .iter()
                .map(|b| ButtonView {
                    label: b.label.clone(),
                    action: b.action,
                })
                .collect(),
        }
    }
}

/// What the presenter receives when a step is shown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepView {
    pub id: String,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<AnchorView>,
    pub buttons: Vec<ButtonView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnchorView {
    pub selector: String,
    pub side: AnchorSide,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ButtonView {
    pub label: String,
    pub action: ButtonAction,
}
