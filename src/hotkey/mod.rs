//! Keyboard event sources
//!
//! Two sources feed the chord machine: the text stream of
//! `xinput test-xi2 --root`, and raw `input_event` records read from a
//! `/dev/input/event*` device. Both produce [`RawKeyEvent`]s that are
//! resolved against the configured [`KeyGroups`].

mod device;
mod keys;
mod listener;
mod xinput;

pub use keys::{KeyGroup, KeyGroups, KeySet, NormalizedEvent, Phase, RawKeyEvent};
pub use listener::{EventSource, Source};
