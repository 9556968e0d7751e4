//! Key group definitions and event normalization
//!
//! Provides the two monitored key groups, the raw event type produced by
//! every event source, and the classifier that turns raw keycodes into
//! group-level events for the chord state machine.

use std::collections::HashSet;

/// Which of the two monitored key groups a key belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyGroup {
    /// First chord key (Ctrl by default)
    Group1,
    /// Second chord key (Shift by default)
    Group2,
}

/// Whether a key went down or came up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Down,
    Up,
}

/// A key event as read from a source, before group resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawKeyEvent {
    /// Source-specific keycode (X11 keycode in xinput mode, evdev code in device mode)
    pub code: String,
    pub phase: Phase,
}

impl RawKeyEvent {
    /// Create a raw event from a keycode and phase
    pub fn new(code: impl Into<String>, phase: Phase) -> Self {
        Self {
            code: code.into(),
            phase,
        }
    }
}

/// Source-agnostic event consumed by the chord state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedEvent {
    /// `None` when the key is in neither monitored group
    pub group: Option<KeyGroup>,
    pub phase: Phase,
}

/// Set of keycodes treated as the same logical key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySet {
    codes: HashSet<String>,
}

impl KeySet {
    /// Build a set from a comma-separated list such as `"37,105"`
    ///
    /// Never fails. Segments are trimmed and empty segments are dropped,
    /// so malformed input just produces a set that matches fewer keys.
    pub fn parse(list: &str) -> Self {
        let codes = list
            .split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_owned)
            .collect();
        Self { codes }
    }

    /// Check if a keycode belongs to this set
    pub fn contains(&self, code: &str) -> bool {
        self.codes.contains(code)
    }

    /// Check if the set matches no keycode at all
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// The pair of monitored key groups, fixed at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyGroups {
    pub group1: KeySet,
    pub group2: KeySet,
}

impl KeyGroups {
    /// Create the classifier from the two configured sets
    pub fn new(group1: KeySet, group2: KeySet) -> Self {
        Self { group1, group2 }
    }

    /// Resolve a keycode to its group. Group 1 wins if a code is listed twice.
    pub fn classify(&self, code: &str) -> Option<KeyGroup> {
        if self.group1.contains(code) {
            Some(KeyGroup::Group1)
        } else if self.group2.contains(code) {
            Some(KeyGroup::Group2)
        } else {
            None
        }
    }

    /// Turn a raw event into a group-level event for the chord machine
    pub fn normalize(&self, event: &RawKeyEvent) -> NormalizedEvent {
        NormalizedEvent {
            group: self.classify(&event.code),
            phase: event.phase,
        }
    }
}
