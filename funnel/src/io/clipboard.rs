//! Best-effort clipboard and browser integration.
//!
//! Both adapters walk a list of platform helpers and stop at the first one
//! that succeeds. Failure is never fatal to the session; the flow turns it
//! into a warning.

use std::process::Command;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, info};

use crate::io::process::run_with_input;

const HELPER_TIMEOUT: Duration = Duration::from_secs(5);

/// Destination for copied outreach text.
pub trait Clipboard {
    fn copy(&self, text: &str) -> Result<()>;
}

/// Opens an external URL (profile page, pre-filled post) for the visitor.
pub trait UrlOpener {
    fn open(&self, url: &str) -> Result<()>;
}

/// A helper program and its fixed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl HelperCommand {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

/// Clipboard backed by whichever copy helper the system has.
#[derive(Debug, Clone)]
pub struct SystemClipboard {
    helpers: Vec<HelperCommand>,
    timeout: Duration,
}

impl SystemClipboard {
    pub fn with_helpers(helpers: Vec<HelperCommand>) -> Self {
        Self {
            helpers,
            timeout: HELPER_TIMEOUT,
        }
    }
}

impl Default for SystemClipboard {
    fn default() -> Self {
        Self::with_helpers(default_copy_helpers())
    }
}

impl Clipboard for SystemClipboard {
    fn copy(&self, text: &str) -> Result<()> {
        try_helpers(&self.helpers, self.timeout, |helper| {
            run_with_input(helper.command(), Some(text.as_bytes()), self.timeout)
        })
    }
}

/// Opener backed by the system's "open in default application" helper.
#[derive(Debug, Clone)]
pub struct SystemOpener {
    helpers: Vec<HelperCommand>,
    timeout: Duration,
}

impl SystemOpener {
    pub fn with_helpers(helpers: Vec<HelperCommand>) -> Self {
        Self {
            helpers,
            timeout: HELPER_TIMEOUT,
        }
    }
}

impl Default for SystemOpener {
    fn default() -> Self {
        Self::with_helpers(default_open_helpers())
    }
}

impl UrlOpener for SystemOpener {
    fn open(&self, url: &str) -> Result<()> {
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(anyhow!("refusing to open non-http url {url}"));
        }
        try_helpers(&self.helpers, self.timeout, |helper| {
            let mut cmd = helper.command();
            cmd.arg(url);
            run_with_input(cmd, None, self.timeout)
        })
    }
}

fn try_helpers<F>(helpers: &[HelperCommand], timeout: Duration, mut run: F) -> Result<()>
where
    F: FnMut(&HelperCommand) -> Result<()>,
{
    let mut failures = Vec::new();
    for helper in helpers {
        match run(helper) {
            Ok(()) => {
                info!(program = %helper.program, "helper succeeded");
                return Ok(());
            }
            Err(err) => {
                debug!(program = %helper.program, err = %format!("{err:#}"), "helper failed");
                failures.push(format!("{}: {err:#}", helper.program));
            }
        }
    }
    if failures.is_empty() {
        return Err(anyhow!("no helper configured"));
    }
    Err(anyhow!(
        "all helpers failed (timeout {} ms each): {}",
        timeout.as_millis(),
        failures.join("; ")
    ))
}

fn default_copy_helpers() -> Vec<HelperCommand> {
    if cfg!(target_os = "macos") {
        vec![HelperCommand::new("pbcopy", &[])]
    } else if cfg!(target_os = "windows") {
        vec![HelperCommand::new("clip", &[])]
    } else {
        vec![
            HelperCommand::new("wl-copy", &[]),
            HelperCommand::new("xclip", &["-selection", "clipboard"]),
            HelperCommand::new("xsel", &["--clipboard", "--input"]),
        ]
    }
}

fn default_open_helpers() -> Vec<HelperCommand> {
    if cfg!(target_os = "macos") {
        vec![HelperCommand::new("open", &[])]
    } else if cfg!(target_os = "windows") {
        vec![HelperCommand::new("explorer", &[])]
    } else {
        vec![
            HelperCommand::new("xdg-open", &[]),
            HelperCommand::new("gio", &["open"]),
        ]
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn falls_through_to_first_working_helper() {
        let clipboard = SystemClipboard::with_helpers(vec![
            HelperCommand::new("definitely-not-a-real-helper-binary", &[]),
            HelperCommand::new("sh", &["-c", "cat >/dev/null"]),
        ]);
        clipboard.copy("gm").expect("copy");
    }

    #[test]
    fn reports_every_failed_helper() {
        let clipboard = SystemClipboard::with_helpers(vec![
            HelperCommand::new("false", &[]),
            HelperCommand::new("definitely-not-a-real-helper-binary", &[]),
        ]);
        let err = clipboard.copy("gm").expect_err("no helper works");
        let text = format!("{err:#}");
        assert!(text.contains("false"));
        assert!(text.contains("definitely-not-a-real-helper-binary"));
    }

    #[test]
    fn empty_helper_list_is_an_error() {
        let clipboard = SystemClipboard::with_helpers(Vec::new());
        assert!(clipboard.copy("gm").is_err());
    }

    #[test]
    fn opener_rejects_non_http_urls() {
        let opener = SystemOpener::with_helpers(vec![HelperCommand::new("true", &[])]);
        assert!(opener.open("file:///etc/passwd").is_err());
        opener.open("https://x.com/alice").expect("open");
    }
}
