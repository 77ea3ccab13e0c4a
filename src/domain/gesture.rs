use crate::domain::models::TimeBlock;
use crate::domain::slot_grid::slot_width;
use chrono::{DateTime, Utc};

/// Structured intent handed to the reconciliation engine. Pure output of the
/// gesture fold; carries no I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GestureIntent {
    /// Candidate interval `[start, end)` for a new block.
    Create {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// An existing block was selected for editing; the full record rides
    /// along so a confirmation dialog can open pre-filled.
    Edit { block: TimeBlock },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GestureState {
    Idle,
    Dragging {
        anchor: DateTime<Utc>,
        last: DateTime<Utc>,
    },
}

/// Folds slot-level press/enter/release events (or single taps) into
/// candidate intervals. The end candidate recorded during a drag is not
/// committed until release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GestureTranslator {
    state: GestureState,
}

impl Default for GestureTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl GestureTranslator {
    pub fn new() -> Self {
        Self {
            state: GestureState::Idle,
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, GestureState::Dragging { .. })
    }

    /// The normalized inclusive slot range currently highlighted by a drag,
    /// for renderers that mark selected slots.
    pub fn selection(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match self.state {
            GestureState::Idle => None,
            GestureState::Dragging { anchor, last } => {
                Some((anchor.min(last), anchor.max(last)))
            }
        }
    }

    /// Press on a slot. Occupied slots are not a creation gesture: they emit
    /// an edit intent instead. Empty interactive slots begin a drag.
    pub fn slot_press(
        &mut self,
        slot: DateTime<Utc>,
        occupant: Option<&TimeBlock>,
        interactive_day: bool,
    ) -> Option<GestureIntent> {
        if !interactive_day || self.state != GestureState::Idle {
            return None;
        }
        if let Some(block) = occupant {
            return Some(GestureIntent::Edit {
                block: block.clone(),
            });
        }
        self.state = GestureState::Dragging {
            anchor: slot,
            last: slot,
        };
        None
    }

    /// Pointer entered a slot mid-drag; records the current end candidate.
    pub fn slot_enter(&mut self, slot: DateTime<Utc>) {
        if let GestureState::Dragging { anchor, .. } = self.state {
            self.state = GestureState::Dragging { anchor, last: slot };
        }
    }

    /// Release ends the drag. A press-and-release on one slot is a click and
    /// yields a single-slot interval; otherwise the anchor/last pair is
    /// normalized and the end is one slot past the last highlighted slot.
    pub fn slot_release(&mut self) -> Option<GestureIntent> {
        let GestureState::Dragging { anchor, last } = self.state else {
            return None;
        };
        self.state = GestureState::Idle;

        let (lo, hi) = (anchor.min(last), anchor.max(last));
        Some(GestureIntent::Create {
            start: lo,
            end: hi + slot_width(),
        })
    }

    /// Direct click with no preceding press (tap semantics). Empty slots
    /// yield a single-slot interval immediately without entering a drag.
    pub fn tap(
        &mut self,
        slot: DateTime<Utc>,
        occupant: Option<&TimeBlock>,
        interactive_day: bool,
    ) -> Option<GestureIntent> {
        if !interactive_day || self.state != GestureState::Idle {
            return None;
        }
        match occupant {
            Some(block) => Some(GestureIntent::Edit {
                block: block.clone(),
            }),
            None => Some(GestureIntent::Create {
                start: slot,
                end: slot + slot_width(),
            }),
        }
    }

    /// Click on a rendered block body, bypassing slot resolution.
    pub fn block_click(&self, block: &TimeBlock) -> GestureIntent {
        GestureIntent::Edit {
            block: block.clone(),
        }
    }
}
