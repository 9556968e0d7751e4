//! Chord detection state machine
//!
//! Tracks whether each key group is held and whether a chord has been
//! formed, and fires the layout switcher when a formed chord starts
//! being released.

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::hotkey::{KeyGroup, KeyGroups, NormalizedEvent, Phase, RawKeyEvent};
use crate::layout::LayoutSwitcher;

/// Press state of the two key groups
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChordState {
    /// Any key of group 1 is held
    pub group1_down: bool,
    /// Any key of group 2 is held
    pub group2_down: bool,
    /// A chord was formed and not yet cancelled by an unrelated key press
    pub armed: bool,
}

impl ChordState {
    /// Apply one event, returning the next state and whether to switch layout
    ///
    /// `armed` is only cleared by a press of a key outside both groups.
    /// Firing does not clear it.
    pub fn apply(self, event: NormalizedEvent) -> (ChordState, bool) {
        let mut next = self;

        match event.phase {
            Phase::Down => {
                match event.group {
                    Some(KeyGroup::Group1) => {
                        next.group1_down = true;
                        next.armed = self.group2_down;
                    }
                    Some(KeyGroup::Group2) => {
                        next.group2_down = true;
                        next.armed = self.group1_down;
                    }
                    None => next.armed = false,
                }
                (next, false)
            }
            Phase::Up => {
                let do_switch = match event.group {
                    Some(KeyGroup::Group1) => {
                        next.group1_down = false;
                        self.group2_down
                    }
                    Some(KeyGroup::Group2) => {
                        next.group2_down = false;
                        self.group1_down
                    }
                    None => false,
                };
                (next, next.armed && do_switch)
            }
        }
    }
}

/// Owns the chord state and drives the layout switcher from raw events
pub struct ChordMachine<S> {
    state: ChordState,
    groups: KeyGroups,
    switcher: S,
    /// Number of layout switches requested so far
    triggers: u64,
}

impl<S: LayoutSwitcher> ChordMachine<S> {
    pub fn new(groups: KeyGroups, switcher: S) -> Self {
        Self {
            state: ChordState::default(),
            groups,
            switcher,
            triggers: 0,
        }
    }

    pub fn state(&self) -> ChordState {
        self.state
    }

    pub fn triggers(&self) -> u64 {
        self.triggers
    }

    /// Process events until every sender is dropped
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<RawKeyEvent>) -> Self {
        info!("chord machine started");

        while let Some(event) = event_rx.recv().await {
            self.handle_event(&event);
        }

        info!(triggers = self.triggers, "chord machine stopped");
        self
    }

    /// Handle one raw event, returning whether it triggered a switch
    pub fn handle_event(&mut self, event: &RawKeyEvent) -> bool {
        let normalized = self.groups.normalize(event);
        let (next, triggered) = self.state.apply(normalized);

        if next != self.state {
            debug!(from = ?self.state, to = ?next, "chord state changed");
        }
        self.state = next;

        if triggered {
            self.triggers += 1;
            debug!(code = %event.code, "chord released, changing layout");
            self.switcher.switch_layout();
        }

        triggered
    }
}
