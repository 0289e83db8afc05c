use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::selector::Selector;
use crate::surface::{Marking, UiSurface};

/// Owns the muted/emphasized marking state of the block palette.
///
/// `restrict_to` marks every element of the pool as either muted or
/// emphasized depending on whether it matches the target; `clear_all`
/// removes the markings again. The registry keeps its own ledger of applied
/// markings and clears from that rather than from a fresh query, so a card
/// that unmounted in between is still cleared host-side. At most one
/// restrict window is open at a time.
pub struct VisualStateRegistry {
    surface: Arc<dyn UiSurface>,
    /// Selector for the whole palette population.
    pool: Selector,
    marked: Mutex<HashMap<String, Marking>>,
}

impl VisualStateRegistry {
    pub fn new(surface: Arc<dyn UiSurface>, pool: Selector) -> Self {
        Self {
            surface,
            pool,
            marked: Mutex::new(HashMap::new()),
        }
    }

    /// Mark the pool element matching `target` as emphasized and every other
    /// pool element as muted.
    pub fn restrict_to(&self, target: &Selector) {
        let Ok(mut marked) = self.marked.lock() else {
            return;
        };
        if !marked.is_empty() {
            // Two steps may not hold overlapping restrict windows; the
            // previous window is closed before the new one opens.
            warn!("restrict_to called while a restrict window was open; clearing it first");
            for (key, _) in marked.drain() {
                self.surface.apply_marking(&key, Marking::Clear);
            }
        }
        let mut emphasized = 0usize;
        for element in self.surface.query_all(&self.pool) {
            let marking = if target.matches(&element.attributes) {
                emphasized += 1;
                Marking::Emphasized
            } else {
                Marking::Muted
            };
            self.surface.apply_marking(&element.key, marking);
            marked.insert(element.key, marking);
        }
        debug!(total = marked.len(), emphasized, %target, "palette restricted");
    }

    /// Remove both markings from every element this registry marked.
    pub fn clear_all(&self) {
        let Ok(mut marked) = self.marked.lock() else {
            return;
        };
        let cleared = marked.len();
        for (key, _) in marked.drain() {
            self.surface.apply_marking(&key, Marking::Clear);
        }
        if cleared > 0 {
            debug!(cleared, "palette markings cleared");
        }
    }

    /// Whether a restrict window is currently open.
    pub fn is_restricted(&self) -> bool {
        self.marked.lock().map(|m| !m.is_empty()).unwrap_or(false)
    }
}
