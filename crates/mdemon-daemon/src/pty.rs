//! PTY command runner
//!
//! Runs one external command with its stdin/stdout/stderr attached to the
//! slave side of a pseudo-terminal, so the tool behaves as it would on an
//! interactive terminal (minipro changes buffering and progress output when
//! not attached to a TTY -- a plain pipe is not enough).
//!
//! The runner knows nothing about what the output means. It streams raw
//! chunks to an optional callback in read order, captures everything, and
//! enforces a wall-clock timeout. All of this is blocking by design: callers
//! run it on a worker thread (`tokio::task::spawn_blocking`).

use std::fs::File;
use std::io::Read;
use std::os::fd::{AsFd, BorrowedFd};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use mdemon_core::prelude::*;

/// Poll granularity for terminal reads.
const POLL_INTERVAL_MS: u8 = 50;

/// Read buffer size for each terminal read.
const READ_BUFFER_SIZE: usize = 4096;

/// Captured result of one PTY command invocation.
#[derive(Debug, Clone)]
pub struct TtyOutput {
    /// Exit code of the child (0 = success; -1 if killed by a signal).
    pub code: i32,
    /// Full captured output, decoded lossily.
    pub text: String,
}

impl TtyOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Run a command under a PTY without streaming.
pub fn run_tty(program: &Path, args: &[String], timeout: Duration) -> Result<TtyOutput> {
    run_tty_stream(program, args, timeout, |_chunk| {})
}

/// Run a command under a PTY, streaming output chunks as they arrive.
///
/// Every non-empty read from the terminal master is appended to the capture
/// buffer and forwarded to `on_chunk` decoded as text with invalid byte
/// sequences replaced. Chunks arrive in the exact order bytes were read.
///
/// If the child does not exit within `timeout` it is killed and reaped, and
/// [`Error::Timeout`] is returned; no exit code is available in that case.
/// The terminal descriptors are released on every exit path.
pub fn run_tty_stream(
    program: &Path,
    args: &[String],
    timeout: Duration,
    mut on_chunk: impl FnMut(&str),
) -> Result<TtyOutput> {
    let pty = nix::pty::openpty(None, None)
        .map_err(|e| Error::pty(format!("openpty failed: {}", e)))?;

    // Master is wrapped in a File so reads and RAII close are plain std.
    let mut master = File::from(pty.master);

    let stdin = pty
        .slave
        .try_clone()
        .map_err(|e| Error::pty(format!("slave dup failed: {}", e)))?;
    let stdout = pty
        .slave
        .try_clone()
        .map_err(|e| Error::pty(format!("slave dup failed: {}", e)))?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::from(stdin))
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(pty.slave))
        .env("TERM", "dumb")
        .env("LC_ALL", "C")
        .spawn()
        .map_err(|e| Error::spawn(format!("{}: {}", program.display(), e)))?;
    // The slave fds now live only in the child; the parent holds the master.

    debug!("spawned {} {:?} (pid {})", program.display(), args, child.id());

    let started = Instant::now();
    let mut captured: Vec<u8> = Vec::new();
    let mut buf = [0u8; READ_BUFFER_SIZE];

    let code = loop {
        if let Some(status) = child.try_wait()? {
            // Drain whatever the child flushed on its way out before
            // closing the master.
            drain_remaining(&mut master, &mut captured, &mut buf, &mut on_chunk);
            break status.code().unwrap_or(-1);
        }

        if started.elapsed() > timeout {
            kill_and_reap(&mut child);
            let described = describe(program, args);
            warn!("timeout after {:?}: {}", timeout, described);
            return Err(Error::timeout(described, timeout.as_secs()));
        }

        if wait_readable(master.as_fd(), PollTimeout::from(POLL_INTERVAL_MS))? {
            if let Some(n) = read_chunk(&mut master, &mut buf) {
                forward(&buf[..n], &mut captured, &mut on_chunk);
            }
        }
    };

    trace!("{} exited with code {}", program.display(), code);
    Ok(TtyOutput {
        code,
        text: String::from_utf8_lossy(&captured).into_owned(),
    })
}

fn describe(program: &Path, args: &[String]) -> String {
    let mut parts = vec![program.display().to_string()];
    parts.extend(args.iter().cloned());
    parts.join(" ")
}

fn forward(chunk: &[u8], captured: &mut Vec<u8>, on_chunk: &mut impl FnMut(&str)) {
    captured.extend_from_slice(chunk);
    let text = String::from_utf8_lossy(chunk);
    on_chunk(&text);
}

/// Poll the master for readability. EINTR counts as "nothing yet".
fn wait_readable(fd: BorrowedFd<'_>, timeout: PollTimeout) -> Result<bool> {
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
    match poll(&mut fds, timeout) {
        Ok(n) if n > 0 => Ok(fds[0]
            .revents()
            .map(|r| r.intersects(PollFlags::POLLIN | PollFlags::POLLHUP))
            .unwrap_or(false)),
        Ok(_) => Ok(false),
        Err(Errno::EINTR) => Ok(false),
        Err(e) => Err(Error::pty(format!("poll failed: {}", e))),
    }
}

/// Read one chunk from the master. EOF and EIO (all slave handles closed)
/// both end the stream.
fn read_chunk(master: &mut File, buf: &mut [u8]) -> Option<usize> {
    match master.read(buf) {
        Ok(0) => None,
        Ok(n) => Some(n),
        Err(_) => None,
    }
}

/// Bounded final drain after child exit: keep reading while the master
/// reports data within one poll interval, then stop.
fn drain_remaining(
    master: &mut File,
    captured: &mut Vec<u8>,
    buf: &mut [u8],
    on_chunk: &mut impl FnMut(&str),
) {
    loop {
        match wait_readable(master.as_fd(), PollTimeout::from(POLL_INTERVAL_MS)) {
            Ok(true) => match read_chunk(master, buf) {
                Some(n) => forward(&buf[..n], captured, on_chunk),
                None => break,
            },
            _ => break,
        }
    }
}

fn kill_and_reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!("failed to kill child {}: {}", child.id(), e);
    }
    // Reap so the child cannot linger as a zombie.
    let _ = child.wait();
}
