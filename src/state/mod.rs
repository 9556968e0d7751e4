//! Chord state machine
//!
//! Tracks the two key groups and fires a layout switch when a chord of
//! both groups is released.

mod machine;

pub use machine::{ChordMachine, ChordState};
