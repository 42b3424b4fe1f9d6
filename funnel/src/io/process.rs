//! Helper for short-lived desktop commands (clipboard, URL opener).

use std::io::Write;
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Run `cmd` to completion, feeding it `stdin`, and require a zero exit status.
///
/// Output streams are discarded: helpers such as `xclip` fork a background
/// process that keeps inherited pipes open, so reading them could block.
#[instrument(skip_all, fields(program = ?cmd.get_program(), timeout_ms = timeout.as_millis() as u64))]
pub fn run_with_input(mut cmd: Command, stdin: Option<&[u8]>, timeout: Duration) -> Result<()> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::null()).stderr(Stdio::null());

    debug!("spawning helper process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            debug!(err = %e, "helper not available");
            return Err(e).context("spawn command");
        }
    };

    if let Some(input) = stdin {
        // Dropping the handle closes the pipe so the helper sees EOF.
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        if let Err(e) = child_stdin.write_all(input) {
            error!(err = %e, "failed to write helper stdin");
            let _ = child.kill();
            let _ = child.wait();
            return Err(e).context("write stdin");
        }
    }

    let status: ExitStatus = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!("helper timed out, killing");
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?;
            bail!("command timed out after {} ms", timeout.as_millis());
        }
    };

    debug!(exit_code = ?status.code(), "helper finished");
    if !status.success() {
        bail!("command exited with {status}");
    }
    Ok(())
}
