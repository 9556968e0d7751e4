//! Binary event source reading a kernel input device
//!
//! Each record is a little-endian `struct input_event`:
//! two 8-byte time fields, a 2-byte type, a 2-byte code and a 4-byte
//! value. See linux/input-event-codes.h for the constants.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use super::keys::{Phase, RawKeyEvent};
use super::listener::{EventSource, SourceError};

/// Size of one `input_event` record on 64-bit Linux
pub const RECORD_SIZE: usize = 24;

/// `EV_KEY`
pub const EV_KEY: u16 = 1;

pub const KEY_UP: i32 = 0;
pub const KEY_DOWN: i32 = 1;
/// Autorepeat, dropped
pub const KEY_REPEAT: i32 = 2;

/// One decoded `input_event` record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceRecord {
    pub sec: i64,
    pub usec: i64,
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

impl DeviceRecord {
    pub fn from_bytes(buf: &[u8; RECORD_SIZE]) -> Self {
        Self {
            sec: i64::from_le_bytes(field(buf, 0)),
            usec: i64::from_le_bytes(field(buf, 8)),
            kind: u16::from_le_bytes(field(buf, 16)),
            code: u16::from_le_bytes(field(buf, 18)),
            value: i32::from_le_bytes(field(buf, 20)),
        }
    }

    /// Key press or release carried by this record, if any
    pub fn key_event(&self) -> Option<RawKeyEvent> {
        if self.kind != EV_KEY {
            return None;
        }
        let phase = match self.value {
            KEY_DOWN => Phase::Down,
            KEY_UP => Phase::Up,
            KEY_REPEAT => {
                trace!(code = self.code, "dropping key repeat");
                return None;
            }
            _ => return None,
        };
        Some(RawKeyEvent::new(self.code.to_string(), phase))
    }
}

fn field<const N: usize>(buf: &[u8; RECORD_SIZE], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[offset..offset + N]);
    out
}

/// Read exactly one record; a short read is an `UnexpectedEof` error
pub async fn read_record<R>(reader: &mut R) -> std::io::Result<DeviceRecord>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; RECORD_SIZE];
    reader.read_exact(&mut buf).await?;
    Ok(DeviceRecord::from_bytes(&buf))
}

/// Event source reading records from a `/dev/input/event*` file
#[derive(Debug, Clone)]
pub struct DeviceSource {
    path: PathBuf,
}

impl DeviceSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl EventSource for DeviceSource {
    async fn run(self, event_tx: mpsc::Sender<RawKeyEvent>) -> Result<(), SourceError> {
        let file = File::open(&self.path)
            .await
            .map_err(|source| SourceError::Open {
                path: self.path.clone(),
                source,
            })?;

        info!(path = ?self.path, "reading input device");

        pump_records(file, &self.path, event_tx).await
    }
}

/// Forward key records until the reader fails
///
/// There is no clean end: end of stream means the device went away, and
/// that is reported as a read error like any other.
async fn pump_records<R>(
    mut reader: R,
    path: &Path,
    event_tx: mpsc::Sender<RawKeyEvent>,
) -> Result<(), SourceError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let record = read_record(&mut reader)
            .await
            .map_err(|source| SourceError::Read {
                path: path.to_owned(),
                source,
            })?;

        let Some(event) = record.key_event() else {
            continue;
        };

        debug!(
            code = record.code,
            phase = ?event.phase,
            sec = record.sec,
            usec = record.usec,
            "Key Code"
        );

        event_tx
            .send(event)
            .await
            .map_err(|_| SourceError::ChannelClosed)?;
    }
}
