//! The narrow interface to the host's node-editor surface.
//!
//! The engine never touches a real element tree; everything it needs from
//! the editor (element queries, pointer events, visual markings, viewport
//! fitting) goes through [`UiSurface`]. The host implements it over its
//! actual UI toolkit; tests implement it over a plain vector of elements.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::selector::Selector;

/// Attributes the engine can observe on a surface element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiElementAttributes {
    /// The element's `data-id`, if tagged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_id: Option<String>,
    /// The element's `data-testid`, if tagged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_id: Option<String>,
    /// Remaining `data-*` attributes (name without the `data-` prefix).
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub data: BTreeMap<String, String>,
}

/// A handle to one element of the host surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiElement {
    /// Host-assigned stable key, used for marking application and as the
    /// `target` of pointer events.
    pub key: String,
    pub attributes: UiElementAttributes,
    /// Bounding box (x, y, width, height) in surface coordinates.
    pub bounds: (f64, f64, f64, f64),
}

impl UiElement {
    /// Check if this element's bounds contain the given point.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        let (bx, by, bw, bh) = self.bounds;
        x >= bx && x < bx + bw && y >= by && y < by + bh
    }
}

/// Visual marking applied to palette elements while a step restricts them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Marking {
    /// Visually de-emphasized and interaction-disabled.
    Muted,
    /// Highlighted as the element the step wants interacted with.
    Emphasized,
    /// No marking.
    Clear,
}

/// Pointer interaction observed on the surface.
///
/// `target` carries the key of the element under the pointer, when the host
/// can attribute the event to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PointerEvent {
    Down {
        x: f64,
        y: f64,
        target: Option<String>,
    },
    Up {
        x: f64,
        y: f64,
        target: Option<String>,
    },
    Click {
        target: String,
    },
}

/// The host's editor surface, as seen by the walkthrough engine.
pub trait UiSurface: Send + Sync {
    /// All elements matching the selector, in document order.
    fn query_all(&self, selector: &Selector) -> Vec<UiElement>;

    /// First element matching the selector, if any.
    fn query(&self, selector: &Selector) -> Option<UiElement> {
        self.query_all(selector).into_iter().next()
    }

    /// Subscribe to the surface's pointer event stream.
    fn pointer_events(&self) -> broadcast::Receiver<PointerEvent>;

    /// Apply a visual marking to the element with the given key.
    ///
    /// Unknown keys must be ignored: the registry clears markings from its
    /// own ledger, which may reference elements that have since unmounted.
    fn apply_marking(&self, key: &str, marking: Marking);

    /// Ask the editor to fit the canvas contents to the viewport.
    fn fit_view(&self);
}

/// Resolve a selector against a flat list of elements with parent links.
///
/// Convenience for `UiSurface` implementors whose element store is a flat
/// collection: handles `Chain`/`Nth` structure so the implementor only
/// supplies leaf matching via [`Selector::matches`]. `parent_of` returns the
/// key of an element's parent, or `None` at the root.
pub fn resolve_selector<'a>(
    elements: &'a [UiElement],
    selector: &Selector,
    parent_of: &dyn Fn(&str) -> Option<String>,
) -> Vec<&'a UiElement> {
    fn is_descendant(parent_of: &dyn Fn(&str) -> Option<String>, child: &str, ancestor: &str) -> bool {
        let mut current = parent_of(child);
        while let Some(key) = current {
            if key == ancestor {
                return true;
            }
            current = parent_of(&key);
        }
        false
    }

    match selector {
        Selector::Chain(segments) => {
            // The first matching segment filters the whole surface; later
            // segments match descendants of the current set. Nth segments
            // filter the current set positionally.
            let mut matched: Option<Vec<&UiElement>> = None;
            for segment in segments {
                matched = Some(match (segment, matched) {
                    (Selector::Nth(index), Some(set)) => {
                        set.get(*index).copied().into_iter().collect()
                    }
                    (Selector::Nth(index), None) => {
                        elements.get(*index).into_iter().collect()
                    }
                    (other, None) => elements
                        .iter()
                        .filter(|el| other.matches(&el.attributes))
                        .collect(),
                    (other, Some(set)) => {
                        let anchors: Vec<String> = set.iter().map(|e| e.key.clone()).collect();
                        elements
                            .iter()
                            .filter(|el| other.matches(&el.attributes))
                            .filter(|el| {
                                anchors.iter().any(|a| is_descendant(parent_of, &el.key, a))
                            })
                            .collect()
                    }
                });
            }
            matched.unwrap_or_default()
        }
        Selector::Nth(index) => elements.get(*index).into_iter().collect(),
        other => elements
            .iter()
            .filter(|el| other.matches(&el.attributes))
            .collect(),
    }
}
