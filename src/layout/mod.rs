//! Keyboard layout switching
//!
//! The switch is an external command run on a detached task, so a slow
//! shell call never stalls event processing. Failures are logged and
//! dropped; the user can just repeat the chord.

use std::process::{ExitStatus, Stdio};

use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Something that can move the session to another input source
pub trait LayoutSwitcher {
    /// Request a layout switch without waiting for it to complete
    fn switch_layout(&self);
}

/// Errors from a single switch attempt
#[derive(Debug, thiserror::Error)]
pub enum SwitchError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// Activates an entry of GNOME Shell's most-recently-used input source list
#[derive(Debug, Clone)]
pub struct GnomeShellSwitcher {
    program: String,
    args: Vec<String>,
}

impl GnomeShellSwitcher {
    /// `mru_index` 1 is the previously used input source
    pub fn new(mru_index: usize) -> Self {
        let script = format!(
            "imports.ui.status.keyboard.getInputSourceManager()._mruSources[{mru_index}].activate()"
        );
        Self::with_command(
            "gdbus",
            [
                "call",
                "--session",
                "--dest",
                "org.gnome.Shell",
                "--object-path",
                "/org/gnome/Shell",
                "--method",
                "org.gnome.Shell.Eval",
                script.as_str(),
            ],
        )
    }

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

    /// Run the switch command to completion
    pub async fn run(&self) -> Result<(), SwitchError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| SwitchError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(SwitchError::Failed {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            })
        }
    }

    /// Run the switch command on a detached task, logging the outcome
    pub fn spawn_switch(&self) -> JoinHandle<Result<(), SwitchError>> {
        let switcher = self.clone();
        tokio::spawn(async move {
            let result = switcher.run().await;
            match &result {
                Ok(()) => debug!("layout switched"),
                Err(e) => warn!(%e, "unable to switch layout"),
            }
            result
        })
    }
}

impl LayoutSwitcher for GnomeShellSwitcher {
    fn switch_layout(&self) {
        // the outcome is already logged by the task
        drop(self.spawn_switch());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gnome_command() {
        let switcher = GnomeShellSwitcher::new(1);
        assert_eq!(switcher.program, "gdbus");
        assert_eq!(switcher.args[0], "call");
        assert!(switcher.args.contains(&"org.gnome.Shell.Eval".to_string()));
        let script = switcher.args.last().unwrap();
        assert!(script.contains("_mruSources[1].activate()"));
    }

    #[test]
    fn test_mru_index_in_script() {
        let switcher = GnomeShellSwitcher::new(2);
        assert!(switcher.args.last().unwrap().contains("_mruSources[2]"));
    }

    #[tokio::test]
    async fn test_run_success() {
        let switcher = GnomeShellSwitcher::with_command("true", Vec::<String>::new());
        assert!(switcher.run().await.is_ok());
    }

    #[tokio::test]
    async fn test_run_reports_failure() {
        let switcher = GnomeShellSwitcher::with_command("sh", ["-c", "echo nope >&2; exit 1"]);
        match switcher.run().await {
            Err(SwitchError::Failed { stderr, status, .. }) => {
                assert_eq!(stderr, "nope");
                assert_eq!(status.code(), Some(1));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_reports_missing_program() {
        let switcher = GnomeShellSwitcher::with_command("layout-chord-no-such-program", Vec::<String>::new());
        assert!(matches!(switcher.run().await, Err(SwitchError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_spawned_switch_reports_outcome() {
        let ok = GnomeShellSwitcher::with_command("true", Vec::<String>::new());
        assert!(ok.spawn_switch().await.unwrap().is_ok());

        let missing = GnomeShellSwitcher::with_command("layout-chord-no-such-program", Vec::<String>::new());
        let result = missing.spawn_switch().await.unwrap();
        assert!(matches!(result, Err(SwitchError::Spawn { .. })));
    }
}
