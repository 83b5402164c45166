//! Spawning and terminating the external credential tool.
//!
//! The tool is always started through an argument vector, never a shell
//! string, so a hostile username cannot smuggle shell syntax past the guard.

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use log::debug;
use nix::errno::Errno;
use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::config::CheckerConfig;
use crate::error::Error;

/// Poll step while waiting out the SIGTERM grace period.
const REAP_TICK: Duration = Duration::from_millis(10);

/// One spawned tool invocation: the child process, its three pipe endpoints,
/// and the exit code once termination has been observed.
///
/// Exclusively owned by one attempt and never reused. [`ProcessHandle::cleanup`]
/// is idempotent and also runs on drop, so the process is released on every
/// exit path.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    exit_code: Option<i32>,
    term_grace: Duration,
}

/// Spawn the tool for `username`: minimal ticket lifetime, cache pointed at
/// the discard destination, all three stdio streams piped and non-blocking.
///
/// # Errors
///
/// Returns [`Error::Launch`] if the operating system cannot create the
/// process and [`Error::Nonblocking`] if a pipe is missing or cannot leave
/// blocking mode. In both cases nothing is left running.
pub fn spawn(config: &CheckerConfig, username: &str) -> Result<ProcessHandle, Error> {
    let mut command = Command::new(&config.command);
    command
        .arg("-l")
        .arg(&config.ticket_lifetime)
        .arg("-c")
        .arg(&config.cache_path)
        .arg(username)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    from_command(&mut command, config.term_grace())
}

/// Spawn an already-configured command under the same handle discipline.
/// All three stdio streams must be piped.
pub(crate) fn from_command(
    command: &mut Command,
    term_grace: Duration,
) -> Result<ProcessHandle, Error> {
    let name = command.get_program().to_string_lossy().into_owned();
    let child = command.spawn().map_err(|source| Error::Launch {
        command: name.clone(),
        source,
    })?;
    let mut handle = ProcessHandle {
        child,
        exit_code: None,
        term_grace,
    };
    if let Err(e) = handle.set_pipes_nonblocking() {
        handle.cleanup();
        return Err(e);
    }
    debug!("spawned {name} (pid {})", handle.child.id());
    Ok(handle)
}

impl ProcessHandle {
    /// Hand the stdin endpoint to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pipe`] when the endpoint was already taken.
    pub(crate) fn take_stdin(&mut self) -> Result<ChildStdin, Error> {
        self.child.stdin.take().ok_or_else(|| endpoint_taken("stdin"))
    }

    /// Hand the stdout endpoint to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pipe`] when the endpoint was already taken.
    pub(crate) fn take_stdout(&mut self) -> Result<ChildStdout, Error> {
        self.child
            .stdout
            .take()
            .ok_or_else(|| endpoint_taken("stdout"))
    }

    /// Hand the stderr endpoint to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pipe`] when the endpoint was already taken.
    pub(crate) fn take_stderr(&mut self) -> Result<ChildStderr, Error> {
        self.child
            .stderr
            .take()
            .ok_or_else(|| endpoint_taken("stderr"))
    }

    /// Exit code, present exactly when termination has been observed.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Non-blocking liveness probe; caches the exit code once seen.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pipe`] if the operating system cannot report the
    /// process status.
    pub fn try_wait(&mut self) -> Result<Option<i32>, Error> {
        if self.exit_code.is_some() {
            return Ok(self.exit_code);
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit_code = Some(exit_code_from_status(status));
                Ok(self.exit_code)
            }
            Ok(None) => Ok(None),
            Err(source) => Err(Error::Pipe {
                op: "status probe",
                source,
            }),
        }
    }

    /// Close any remaining pipes and make sure the process is gone: SIGTERM,
    /// a short grace window, SIGKILL if still alive, then reap.
    ///
    /// Idempotent, and every internal failure is swallowed; once an attempt
    /// reaches cleanup the exit state is no longer semantically needed.
    pub fn cleanup(&mut self) {
        drop(self.child.stdin.take());
        drop(self.child.stdout.take());
        drop(self.child.stderr.take());

        if self.exit_code.is_some() {
            return;
        }
        if let Ok(Some(status)) = self.child.try_wait() {
            self.exit_code = Some(exit_code_from_status(status));
            return;
        }

        if let Ok(pid) = i32::try_from(self.child.id()) {
            let _ = signal::kill(Pid::from_raw(pid), Signal::SIGTERM);
        }
        let deadline = Instant::now() + self.term_grace;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    self.exit_code = Some(exit_code_from_status(status));
                    return;
                }
                Ok(None) => {}
                Err(_) => break,
            }
            if Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(REAP_TICK);
        }

        let _ = self.child.kill();
        if let Ok(status) = self.child.wait() {
            self.exit_code = Some(exit_code_from_status(status));
        }
    }

    fn set_pipes_nonblocking(&self) -> Result<(), Error> {
        let stdin = self.child.stdin.as_ref().ok_or_else(|| missing("stdin"))?;
        set_nonblocking(stdin.as_fd())?;
        let stdout = self.child.stdout.as_ref().ok_or_else(|| missing("stdout"))?;
        set_nonblocking(stdout.as_fd())?;
        let stderr = self.child.stderr.as_ref().ok_or_else(|| missing("stderr"))?;
        set_nonblocking(stderr.as_fd())?;
        Ok(())
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn endpoint_taken(name: &str) -> Error {
    Error::Pipe {
        op: "pipe handoff",
        source: io::Error::other(format!("{name} endpoint already taken")),
    }
}

fn missing(name: &str) -> Error {
    Error::Nonblocking {
        source: io::Error::other(format!("{name} not captured")),
    }
}

/// Switch `fd` to non-blocking mode, preserving its other flags.
fn set_nonblocking(fd: BorrowedFd<'_>) -> Result<(), Error> {
    // nix 0.29's fcntl takes a raw fd.
    let flags = fcntl(fd.as_raw_fd(), FcntlArg::F_GETFL).map_err(nonblocking_err)?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(flags)).map_err(nonblocking_err)?;
    Ok(())
}

fn nonblocking_err(errno: Errno) -> Error {
    Error::Nonblocking {
        source: io::Error::from_raw_os_error(errno as i32),
    }
}

/// Extract an exit code from a process status, mapping signal deaths to 128+N.
fn exit_code_from_status(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .unwrap_or_else(|| status.signal().map_or(1, |s| 128 + s))
}
