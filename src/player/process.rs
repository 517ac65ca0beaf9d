//! Child process helpers: group-aware spawning, tree teardown and stderr capture

use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, Command};
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc::UnboundedSender;

#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// Build a command that starts in its own process group, so the whole tree
/// (yt-dlp spawns its own helpers) can be signalled at once.
pub fn group_command(program: impl AsRef<OsStr>) -> Command {
    let mut cmd = Command::new(program);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }
    cmd
}

/// Kill a child started by `group_command` and everything in its group, then
/// reap it. A child that already exited is only reaped.
pub fn terminate_process_tree(child: &mut Child) -> io::Result<()> {
    if let Ok(Some(_)) = child.try_wait() {
        return Ok(());
    }

    #[cfg(unix)]
    {
        let pgid = child.id() as libc::pid_t;
        // SAFETY: killpg only sends a signal. The child is unreaped, so its pid
        // still names the group it leads.
        let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                tracing::warn!(pid = pgid, error = %err, "killpg failed, killing child only");
                child.kill()?;
            }
        }
    }

    #[cfg(windows)]
    {
        // Helpers started by yt-dlp share its group: break the group first,
        // then TerminateProcess the leader in case it ignored the event.
        if let Err(e) = ctrl_break_group(child.id()) {
            tracing::debug!(pid = child.id(), error = %e, "Ctrl-break to process group failed");
        }
        if let Err(e) = child.kill() {
            if !matches!(child.try_wait(), Ok(Some(_))) {
                return Err(e);
            }
        }
    }

    #[cfg(not(any(unix, windows)))]
    child.kill()?;

    child.wait()?;
    Ok(())
}

#[cfg(windows)]
fn ctrl_break_group(group_id: u32) -> io::Result<()> {
    use windows_sys::Win32::System::Console::{GenerateConsoleCtrlEvent, CTRL_BREAK_EVENT};
    // SAFETY: plain Win32 call with a process group id we created.
    let ok = unsafe { GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, group_id) };
    if ok == 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolLogKind {
    Error,
    Warning,
    Download,
    Youtube,
    Info,
}

impl ToolLogKind {
    fn keyword(self) -> Option<&'static str> {
        match self {
            ToolLogKind::Error => Some("error"),
            ToolLogKind::Warning => Some("warning"),
            ToolLogKind::Download => Some("download"),
            ToolLogKind::Youtube => Some("youtube"),
            ToolLogKind::Info => None,
        }
    }
}

/// One stderr line from an external tool, classified for display
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolLogLine {
    pub tool: String,
    pub kind: ToolLogKind,
    pub text: String,
}

const CLASSIFY_ORDER: [ToolLogKind; 4] = [
    ToolLogKind::Error,
    ToolLogKind::Warning,
    ToolLogKind::Download,
    ToolLogKind::Youtube,
];

impl ToolLogLine {
    /// First keyword found wins, checked in severity order. The text keeps
    /// only what follows the keyword.
    pub fn classify(tool: &str, line: &str) -> Self {
        let lower = line.to_ascii_lowercase();
        for kind in CLASSIFY_ORDER {
            let Some(keyword) = kind.keyword() else { continue };
            if let Some(idx) = lower.find(keyword) {
                let rest = line[idx + keyword.len()..]
                    .trim_start_matches(|c: char| c == ']' || c == ':' || c.is_whitespace())
                    .trim_end();
                return Self {
                    tool: tool.to_string(),
                    kind,
                    text: rest.to_string(),
                };
            }
        }
        Self {
            tool: tool.to_string(),
            kind: ToolLogKind::Info,
            text: line.trim_end().to_string(),
        }
    }
}

pub type ToolLogSender = UnboundedSender<ToolLogLine>;

/// Drain a child's stderr on a thread, mirroring it into `log_path` and,
/// when `forward` is given, sending each classified line. The stream is
/// drained even if the log file cannot be created so the child never blocks.
pub fn spawn_stderr_logger<R>(
    tool: &'static str,
    stderr: R,
    log_path: &Path,
    forward: Option<ToolLogSender>,
) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    let mut log_file = match File::create(log_path) {
        Ok(f) => Some(f),
        Err(e) => {
            tracing::warn!(tool, path = %log_path.display(), error = %e, "Could not create tool log");
            None
        }
    };

    thread::spawn(move || {
        let reader = BufReader::new(stderr);
        for line in reader.split(b'\n') {
            let Ok(raw) = line else { break };
            let line = String::from_utf8_lossy(&raw);
            if let Some(file) = log_file.as_mut() {
                if writeln!(file, "{}", line.trim_end_matches('\r')).is_err() {
                    log_file = None;
                }
            }
            if let Some(tx) = &forward {
                let entry = ToolLogLine::classify(tool, &line);
                if entry.kind == ToolLogKind::Error {
                    tracing::warn!(tool, line = %entry.text, "Tool reported an error");
                }
                let _ = tx.send(entry);
            }
        }
        tracing::trace!(tool, "stderr closed");
    })
}
