//! Event source abstraction
//!
//! Every source produces [`RawKeyEvent`]s into a channel until the
//! underlying stream ends. Exactly one source runs per process, picked
//! from the configuration at startup.

use std::future::Future;
use std::path::PathBuf;
use std::process::ExitStatus;

use tokio::sync::mpsc;

use super::device::DeviceSource;
use super::keys::RawKeyEvent;
use super::xinput::XinputSource;
use crate::config::Config;

/// A producer of raw key events
pub trait EventSource {
    /// Run the source, sending events until the stream ends or fails
    ///
    /// Returns `Ok(())` only when the stream ended cleanly. Any I/O
    /// failure of the underlying process or device is reported as an error.
    fn run(
        self,
        event_tx: mpsc::Sender<RawKeyEvent>,
    ) -> impl Future<Output = Result<(), SourceError>> + Send;
}

/// Errors that end an event source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} has no stdout pipe")]
    MissingStdout(String),

    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read output of {program}: {source}")]
    Output {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    Exited { program: String, status: ExitStatus },

    #[error("failed to open input device {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read input device {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("event channel closed")]
    ChannelClosed,
}

/// The source selected for this run
#[derive(Debug)]
pub enum Source {
    /// Text event blocks from `xinput test-xi2 --root`
    Xinput(XinputSource),
    /// Binary records from a `/dev/input/event*` file
    Device(DeviceSource),
}

impl Source {
    /// Device mode when an input path is configured, xinput mode otherwise
    pub fn from_config(config: &Config) -> Self {
        match &config.input {
            Some(path) => Source::Device(DeviceSource::new(path.clone())),
            None => Source::Xinput(XinputSource::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Source::Xinput(_) => "xinput",
            Source::Device(_) => "device",
        }
    }
}

impl EventSource for Source {
    async fn run(self, event_tx: mpsc::Sender<RawKeyEvent>) -> Result<(), SourceError> {
        match self {
            Source::Xinput(source) => source.run(event_tx).await,
            Source::Device(source) => source.run(event_tx).await,
        }
    }
}
