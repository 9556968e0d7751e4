//! Command line parsing and runtime configuration

use std::path::PathBuf;

use clap::Parser;

use crate::hotkey::{KeyGroups, KeySet};

/// X11 keycodes for left and right Ctrl
pub const DEFAULT_KEY1: &str = "37,105";
/// X11 keycodes for left and right Shift
pub const DEFAULT_KEY2: &str = "50,62";
/// Previously used input source
pub const DEFAULT_MRU_INDEX: usize = 1;

/// Switch keyboard layout when two modifier keys are pressed together
#[derive(Parser, Debug)]
#[command(name = "layout-chord")]
#[command(version)]
#[command(about = "Switch GNOME keyboard layout with a two-key modifier chord", long_about = None)]
pub struct Args {
    /// Dump keyboard events
    #[arg(long)]
    pub debug: bool,

    /// First key codes to monitor, comma separated (default: Ctrl)
    #[arg(long, value_name = "CODES", default_value = DEFAULT_KEY1)]
    pub key1: String,

    /// Second key codes to monitor, comma separated (default: Shift)
    #[arg(long, value_name = "CODES", default_value = DEFAULT_KEY2)]
    pub key2: String,

    /// Read a /dev/input/event* device directly instead of running xinput.
    /// Key codes are then evdev codes, e.g. 29,97 for Ctrl and 42,54 for Shift.
    #[arg(long, value_name = "DEVICE")]
    pub input: Option<PathBuf>,

    /// Input source to activate from GNOME's most-recently-used list
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MRU_INDEX)]
    pub mru_index: usize,
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub groups: KeyGroups,
    pub debug: bool,
    /// Device file; `None` selects xinput mode
    pub input: Option<PathBuf>,
    pub mru_index: usize,
}

impl Config {
    /// Parse the process arguments
    pub fn load() -> Self {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Self {
        Self {
            groups: KeyGroups::new(KeySet::parse(&args.key1), KeySet::parse(&args.key2)),
            debug: args.debug,
            input: args.input,
            mru_index: args.mru_index,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            groups: KeyGroups::new(KeySet::parse(DEFAULT_KEY1), KeySet::parse(DEFAULT_KEY2)),
            debug: false,
            input: None,
            mru_index: DEFAULT_MRU_INDEX,
        }
    }
}
