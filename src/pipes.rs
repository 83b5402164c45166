//! Timed, non-blocking pipe I/O built on one readiness-polling primitive.
//!
//! Every operation loops the same way: ask the operating system which
//! endpoints are ready within a short tick, act only on the ready ones, then
//! re-check the deadline. A hung or silent tool therefore never stalls an
//! attempt beyond its configured timeout, and no call here ever blocks on a
//! pipe.

use std::io::{self, Read, Write};
use std::os::fd::AsFd;
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

use crate::error::Error;
use crate::launch::ProcessHandle;

/// Everything one attempt captured from the tool before it terminated.
/// Produced once by [`drain_until_exit`], consumed by the classifier, then
/// dropped.
#[derive(Debug, Default)]
pub struct CapturedOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Populated exactly when termination was observed.
    pub exit_code: Option<i32>,
}

impl CapturedOutput {
    /// stderr decoded lossily for classification.
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Write all of `data` to `pipe` before `timeout` elapses.
///
/// Each pass polls for writability and writes as much as the pipe accepts.
/// The tool closing its stdin early surfaces as a broken-pipe error here,
/// not as a signal, since the Rust runtime ignores SIGPIPE.
///
/// # Errors
///
/// [`Error::Timeout`] when the deadline passes first, [`Error::Pipe`] on any
/// write failure.
pub fn write_with_timeout<W>(
    pipe: &mut W,
    data: &[u8],
    timeout: Duration,
    tick: Duration,
) -> Result<(), Error>
where
    W: Write + AsFd,
{
    let deadline = Instant::now() + timeout;
    let mut written = 0;
    while written < data.len() {
        let now = Instant::now();
        if now >= deadline {
            return Err(Error::Timeout {
                op: "stdin write",
                timeout,
            });
        }
        let ready = {
            let mut fds = [PollFd::new(pipe.as_fd(), PollFlags::POLLOUT)];
            wait_ready(&mut fds, tick.min(deadline.duration_since(now)))?
        };
        if !ready {
            continue;
        }
        match pipe.write(&data[written..]) {
            Ok(0) => {
                return Err(Error::Pipe {
                    op: "stdin write",
                    source: io::ErrorKind::WriteZero.into(),
                });
            }
            Ok(n) => written += n,
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted => {}
            Err(source) => {
                return Err(Error::Pipe {
                    op: "stdin write",
                    source,
                });
            }
        }
    }
    Ok(())
}

/// Accumulate text from `pipe` until the lossily-decoded accumulation
/// satisfies `stop` or the stream ends; both cases return the text. At most
/// `cap` bytes are retained; anything past that is read and dropped.
///
/// # Errors
///
/// [`Error::Timeout`] when the deadline passes first, [`Error::Pipe`] on
/// read failure.
pub fn read_until<R, F>(
    pipe: &mut R,
    timeout: Duration,
    tick: Duration,
    cap: usize,
    stop: F,
) -> Result<String, Error>
where
    R: Read + AsFd,
    F: Fn(&str) -> bool,
{
    let deadline = Instant::now() + timeout;
    let mut acc = Vec::new();
    loop {
        let now = Instant::now();
        if now >= deadline {
            return Err(Error::Timeout { op: "read", timeout });
        }
        let ready = {
            let mut fds = [PollFd::new(pipe.as_fd(), PollFlags::POLLIN)];
            wait_ready(&mut fds, tick.min(deadline.duration_since(now)))?
        };
        if !ready {
            continue;
        }
        let progress = read_available(pipe, &mut acc, cap)?;
        let text = String::from_utf8_lossy(&acc);
        if matches!(progress, ReadProgress::Eof) || stop(&text) {
            return Ok(text.into_owned());
        }
    }
}

/// Drain both output pipes until the process terminates.
///
/// Each iteration polls whichever pipes are still open in a single readiness
/// check, reads the ready ones, and only then probes liveness; probing first
/// could miss output flushed at death. Once exit is observed a final sweep
/// collects bytes the kernel still buffers for dead writers.
///
/// Each stream retains at most `cap` bytes. Overflow is read and dropped,
/// so a tool flooding its output can neither grow the capture without bound
/// nor stall on a full pipe.
///
/// # Errors
///
/// [`Error::Timeout`] when the process outlives `timeout`, [`Error::Pipe`]
/// on read or status-probe failure.
pub fn drain_until_exit<O, E>(
    stdout: &mut O,
    stderr: &mut E,
    handle: &mut ProcessHandle,
    timeout: Duration,
    tick: Duration,
    cap: usize,
) -> Result<CapturedOutput, Error>
where
    O: Read + AsFd,
    E: Read + AsFd,
{
    let deadline = Instant::now() + timeout;
    let mut out = Vec::new();
    let mut err = Vec::new();
    let mut out_open = true;
    let mut err_open = true;

    loop {
        let now = Instant::now();
        if now >= deadline {
            return Err(Error::Timeout {
                op: "drain",
                timeout,
            });
        }
        let wait = tick.min(deadline.duration_since(now));

        let (read_out, read_err) = {
            let mut fds = Vec::with_capacity(2);
            if out_open {
                fds.push(PollFd::new(stdout.as_fd(), PollFlags::POLLIN));
            }
            if err_open {
                fds.push(PollFd::new(stderr.as_fd(), PollFlags::POLLIN));
            }
            if fds.is_empty() {
                // Both streams hit end-of-stream before the process died;
                // keep probing liveness at the poll cadence.
                thread::sleep(wait);
                (false, false)
            } else {
                wait_ready(&mut fds, wait)?;
                // fds holds the open pipes in stdout-then-stderr order; the
                // lazy `&&` keeps the iterator aligned with that order.
                let mut ready = fds.iter();
                let read_out = out_open && ready.next().is_some_and(readable);
                let read_err = err_open && ready.next().is_some_and(readable);
                (read_out, read_err)
            }
        };

        if read_out && matches!(read_available(stdout, &mut out, cap)?, ReadProgress::Eof) {
            out_open = false;
        }
        if read_err && matches!(read_available(stderr, &mut err, cap)?, ReadProgress::Eof) {
            err_open = false;
        }

        if let Some(code) = handle.try_wait()? {
            if out_open {
                let _ = read_available(stdout, &mut out, cap);
            }
            if err_open {
                let _ = read_available(stderr, &mut err, cap);
            }
            return Ok(CapturedOutput {
                stdout: out,
                stderr: err,
                exit_code: Some(code),
            });
        }
    }
}

/// One poll pass over `fds`, bounded by `tick`. Returns whether anything is
/// ready; EINTR counts as "nothing yet".
fn wait_ready(fds: &mut [PollFd<'_>], tick: Duration) -> Result<bool, Error> {
    let millis = u16::try_from(tick.as_millis()).unwrap_or(u16::MAX);
    match poll(fds, PollTimeout::from(millis)) {
        Ok(n) => Ok(n > 0),
        Err(Errno::EINTR) => Ok(false),
        Err(errno) => Err(Error::Pipe {
            op: "poll",
            source: io::Error::from_raw_os_error(errno as i32),
        }),
    }
}

/// Ready-to-read includes hangup and error states so end-of-stream is
/// observed instead of polled past.
fn readable(fd: &PollFd<'_>) -> bool {
    fd.revents().is_some_and(|r| {
        r.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR)
    })
}

enum ReadProgress {
    Open,
    Eof,
}

/// Read whatever is currently buffered on a non-blocking pipe, keeping at
/// most `cap` bytes in `acc`. Reads continue past the cap so the writer is
/// always drained, even when nothing more is retained.
fn read_available<R: Read>(
    pipe: &mut R,
    acc: &mut Vec<u8>,
    cap: usize,
) -> Result<ReadProgress, Error> {
    let mut chunk = [0u8; 4096];
    loop {
        match pipe.read(&mut chunk) {
            Ok(0) => return Ok(ReadProgress::Eof),
            Ok(n) => {
                let room = cap.saturating_sub(acc.len());
                acc.extend_from_slice(&chunk[..n.min(room)]);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(ReadProgress::Open),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(source) => return Err(Error::Pipe { op: "read", source }),
        }
    }
}
