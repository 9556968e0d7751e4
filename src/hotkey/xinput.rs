//! Text event source backed by `xinput test-xi2 --root`
//!
//! xinput prints one block per event:
//!
//! ```text
//! EVENT type 13 (RawKeyPress)
//!     device: 3 (3)
//!     detail: 37
//!     valuators:
//!
//! ```
//!
//! A block ends at a blank line or a `valuators:` line. A new `EVENT`
//! header also closes the previous block, since not every stream shape
//! terminates a block before the next header.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use super::keys::{Phase, RawKeyEvent};
use super::listener::{EventSource, SourceError};

const XINPUT_PROGRAM: &str = "xinput";
const XINPUT_ARGS: [&str; 2] = ["test-xi2", "--root"];

/// Lines buffered between the stdout reader and the parser
const LINE_CHANNEL_CAPACITY: usize = 256;

/// Fields collected for the event block currently being read
#[derive(Debug, Default)]
struct PendingEvent {
    /// Header type token with parentheses stripped, empty when unset
    kind: String,
    detail: Option<String>,
}

/// Line-oriented parser for xinput event blocks
#[derive(Debug, Default)]
pub struct XinputParser {
    pending: PendingEvent,
}

impl XinputParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line of output, returning a key event if the line completed one
    pub fn feed(&mut self, line: &str) -> Option<RawKeyEvent> {
        let text = line.trim();

        if text.starts_with("EVENT ") {
            let flushed = self.flush();
            let kind = text
                .split_whitespace()
                .nth(3)
                .map(|token| token.trim_matches(|c| c == '(' || c == ')'))
                .unwrap_or_default();
            self.pending.kind = kind.to_owned();
            return flushed;
        }

        if text.starts_with("detail:") {
            if let Some(code) = text.split_whitespace().nth(1) {
                self.pending.detail = Some(code.to_owned());
            }
        }

        let first = text.split_whitespace().next().unwrap_or_default();
        if text.is_empty() || first.starts_with("valuators:") {
            return self.flush();
        }

        None
    }

    /// Close the pending block and reset it
    ///
    /// Flushing an empty block is a no-op, so calling this twice in a
    /// row never produces a second event.
    pub fn flush(&mut self) -> Option<RawKeyEvent> {
        let pending = std::mem::take(&mut self.pending);
        if pending.kind.is_empty() {
            return None;
        }

        let phase = match pending.kind.as_str() {
            "RawKeyPress" => Phase::Down,
            "RawKeyRelease" | "RawKeyRecord" => Phase::Up,
            other => {
                trace!(kind = other, "ignoring non-key event");
                return None;
            }
        };

        match pending.detail {
            Some(code) => Some(RawKeyEvent { code, phase }),
            None => {
                trace!(kind = %pending.kind, "key event without detail line");
                None
            }
        }
    }
}

/// Event source that runs xinput and parses its stdout
#[derive(Debug, Clone)]
pub struct XinputSource {
    program: String,
    args: Vec<String>,
}

impl XinputSource {
    pub fn new() -> Self {
        Self::with_command(XINPUT_PROGRAM, XINPUT_ARGS)
    }

    /// Use a different command that produces the same block format
    pub fn with_command<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for XinputSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for XinputSource {
    async fn run(self, event_tx: mpsc::Sender<RawKeyEvent>) -> Result<(), SourceError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SourceError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SourceError::MissingStdout(self.program.clone()))?;

        info!(program = %self.program, pid = ?child.id(), "event source started");

        let parse = pump_output(stdout, self.program.clone(), event_tx);
        tokio::pin!(parse);

        let wait_error = |source: std::io::Error| SourceError::Wait {
            program: self.program.clone(),
            source,
        };

        // Whichever finishes first, let the other drain so no trailing
        // events are lost.
        let status = tokio::select! {
            status = child.wait() => {
                let status = status.map_err(wait_error)?;
                parse.await?;
                status
            }
            result = &mut parse => {
                result?;
                child.wait().await.map_err(wait_error)?
            }
        };

        if status.success() {
            info!(program = %self.program, "event source exited");
            Ok(())
        } else {
            Err(SourceError::Exited {
                program: self.program,
                status,
            })
        }
    }
}

/// Read the process output and parse it into key events
///
/// Returns once the output closes. A read failure on the output is an
/// error; undecodable bytes are not.
async fn pump_output<R>(
    output: R,
    program: String,
    event_tx: mpsc::Sender<RawKeyEvent>,
) -> Result<(), SourceError>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (line_tx, line_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
    let forward = tokio::spawn(forward_lines(output, line_tx));

    parse_lines(line_rx, event_tx).await?;

    let source = match forward.await {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(e)) => e,
        Err(e) => std::io::Error::other(e),
    };
    Err(SourceError::Output { program, source })
}

/// Copy lines from the process output into the line channel
///
/// Lines are decoded lossily, so a stray non-UTF-8 byte only garbles
/// its own line.
async fn forward_lines<R>(output: R, line_tx: mpsc::Sender<String>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(output);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf)
            .trim_end_matches(|c| c == '\n' || c == '\r')
            .to_owned();
        if line_tx.send(line).await.is_err() {
            return Ok(());
        }
    }
}

/// Parse lines into key events until the line channel closes
async fn parse_lines(
    mut line_rx: mpsc::Receiver<String>,
    event_tx: mpsc::Sender<RawKeyEvent>,
) -> Result<(), SourceError> {
    let mut parser = XinputParser::new();

    while let Some(line) = line_rx.recv().await {
        if let Some(event) = parser.feed(&line) {
            send_event(&event_tx, event).await?;
        }
    }

    if let Some(event) = parser.flush() {
        send_event(&event_tx, event).await?;
    }

    Ok(())
}

async fn send_event(
    event_tx: &mpsc::Sender<RawKeyEvent>,
    event: RawKeyEvent,
) -> Result<(), SourceError> {
    debug!(code = %event.code, phase = ?event.phase, "EVENT");
    event_tx
        .send(event)
        .await
        .map_err(|_| SourceError::ChannelClosed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::keys::{KeyGroup, KeyGroups, KeySet, NormalizedEvent};

    const CHORD_OUTPUT: &str = "\
EVENT type 13 (RawKeyPress)
    device: 3 (3)
    time: 12345
    detail: 37
    flags:
    valuators:

EVENT type 13 (RawKeyPress)
    device: 3 (3)
    time: 12350
    detail: 50
    flags:
    valuators:

EVENT type 14 (RawKeyRelease)
    device: 3 (3)
    time: 12400
    detail: 50
    flags:
    valuators:

EVENT type 14 (RawKeyRelease)
    device: 3 (3)
    time: 12410
    detail: 37
    flags:
    valuators:

";

    fn parse_all(output: &str) -> Vec<RawKeyEvent> {
        let mut parser = XinputParser::new();
        let mut events: Vec<RawKeyEvent> = output.lines().filter_map(|l| parser.feed(l)).collect();
        events.extend(parser.flush());
        events
    }

    #[test]
    fn test_parse_chord_blocks() {
        let groups = KeyGroups::new(KeySet::parse("37,105"), KeySet::parse("50,62"));
        let normalized: Vec<NormalizedEvent> = parse_all(CHORD_OUTPUT)
            .iter()
            .map(|event| groups.normalize(event))
            .collect();

        let expected = [
            (KeyGroup::Group1, Phase::Down),
            (KeyGroup::Group2, Phase::Down),
            (KeyGroup::Group2, Phase::Up),
            (KeyGroup::Group1, Phase::Up),
        ];
        assert_eq!(normalized.len(), expected.len());
        for (event, (group, phase)) in normalized.iter().zip(expected) {
            assert_eq!(event.group, Some(group));
            assert_eq!(event.phase, phase);
        }
    }

    #[test]
    fn test_header_flushes_unterminated_block() {
        let output = "\
EVENT type 13 (RawKeyPress)
    detail: 38
EVENT type 14 (RawKeyRelease)
    detail: 38
";
        let events = parse_all(output);
        assert_eq!(
            events,
            vec![
                RawKeyEvent::new("38", Phase::Down),
                RawKeyEvent::new("38", Phase::Up),
            ]
        );
    }

    #[test]
    fn test_flush_twice_is_noop() {
        let mut parser = XinputParser::new();
        assert_eq!(parser.feed("EVENT type 13 (RawKeyPress)"), None);
        assert_eq!(parser.feed("    detail: 37"), None);

        assert_eq!(parser.flush(), Some(RawKeyEvent::new("37", Phase::Down)));
        assert_eq!(parser.flush(), None);
        assert_eq!(parser.feed(""), None);
    }

    #[test]
    fn test_raw_key_record_is_release() {
        let events = parse_all("EVENT type 14 (RawKeyRecord)\n detail: 62\n\n");
        assert_eq!(events, vec![RawKeyEvent::new("62", Phase::Up)]);
    }

    #[test]
    fn test_ignores_unknown_types_and_leading_noise() {
        let output = "\
xinput version 2.2
garbage line

EVENT type 17 (RawMotion)
    detail: 0
    valuators:

EVENT type 13 (RawKeyPress)
    detail: 105
    valuators:
";
        let events = parse_all(output);
        assert_eq!(events, vec![RawKeyEvent::new("105", Phase::Down)]);
    }

    #[test]
    fn test_discards_key_event_without_detail() {
        let events = parse_all("EVENT type 13 (RawKeyPress)\n    device: 3 (3)\n\n");
        assert!(events.is_empty());
    }

    #[test]
    fn test_short_header_is_ignored() {
        let events = parse_all("EVENT type\n    detail: 37\n\n");
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_pump_output_parses_split_reads() {
        let output = tokio_test::io::Builder::new()
            .read(b"EVENT type 13 (RawKeyPress)\n    detail: 37\n")
            .read(b"    valuators:\n\nEVENT type 14 (RawKeyRelease)\n    detail: 37\n\n")
            .build();
        let (event_tx, mut event_rx) = mpsc::channel(8);

        pump_output(output, "xinput".to_string(), event_tx).await.unwrap();

        assert_eq!(event_rx.recv().await, Some(RawKeyEvent::new("37", Phase::Down)));
        assert_eq!(event_rx.recv().await, Some(RawKeyEvent::new("37", Phase::Up)));
        assert_eq!(event_rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_pump_output_survives_invalid_utf8() {
        let output = tokio_test::io::Builder::new()
            .read(b"EVENT type 2 (KeyPress)\n    device: \xff\xfe\n\n")
            .read(b"EVENT type 13 (RawKeyPress)\n    detail: 50\n\n")
            .build();
        let (event_tx, mut event_rx) = mpsc::channel(8);

        pump_output(output, "xinput".to_string(), event_tx).await.unwrap();

        assert_eq!(event_rx.recv().await, Some(RawKeyEvent::new("50", Phase::Down)));
        assert_eq!(event_rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_pump_output_fails_on_read_error() {
        let output = tokio_test::io::Builder::new()
            .read(b"EVENT type 13 (RawKeyPress)\n    detail: 37\n\n")
            .read_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe gone"))
            .build();
        let (event_tx, mut event_rx) = mpsc::channel(8);

        let result = pump_output(output, "xinput".to_string(), event_tx).await;
        match result {
            Err(SourceError::Output { program, source }) => {
                assert_eq!(program, "xinput");
                assert_eq!(source.kind(), std::io::ErrorKind::BrokenPipe);
            }
            other => panic!("expected output error, got {other:?}"),
        }

        // events read before the failure are still delivered
        assert_eq!(event_rx.recv().await, Some(RawKeyEvent::new("37", Phase::Down)));
        assert_eq!(event_rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_parse_lines_reports_closed_consumer() {
        let (line_tx, line_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = mpsc::channel(8);
        drop(event_rx);

        line_tx.send("EVENT type 13 (RawKeyPress)".to_string()).await.unwrap();
        line_tx.send("detail: 37".to_string()).await.unwrap();
        line_tx.send(String::new()).await.unwrap();
        drop(line_tx);

        let result = parse_lines(line_rx, event_tx).await;
        assert!(matches!(result, Err(SourceError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_source_runs_process_to_completion() {
        let script = "printf 'EVENT type 13 (RawKeyPress)\\n    detail: 50\\n\\n'";
        let source = XinputSource::with_command("sh", ["-c", script]);
        let (event_tx, mut event_rx) = mpsc::channel(8);

        source.run(event_tx).await.unwrap();

        assert_eq!(event_rx.recv().await, Some(RawKeyEvent::new("50", Phase::Down)));
        assert_eq!(event_rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_source_reports_failed_process() {
        let source = XinputSource::with_command("sh", ["-c", "exit 3"]);
        let (event_tx, _event_rx) = mpsc::channel(8);

        let result = source.run(event_tx).await;
        assert!(matches!(result, Err(SourceError::Exited { .. })));
    }

    #[tokio::test]
    async fn test_source_reports_missing_program() {
        let source = XinputSource::with_command("layout-chord-no-such-program", Vec::<String>::new());
        let (event_tx, _event_rx) = mpsc::channel(8);

        let result = source.run(event_tx).await;
        assert!(matches!(result, Err(SourceError::Spawn { .. })));
    }
}
