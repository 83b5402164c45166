//! Attempt orchestration: one external-tool invocation per `authenticate`
//! call, bounded in time on every path.

use std::thread;
use std::time::Instant;

use log::debug;

use crate::classify::{Verdict, classify};
use crate::config::CheckerConfig;
use crate::error::Error;
use crate::guard;
use crate::launch::{self, ProcessHandle};
use crate::pipes;

/// Drives the external credential tool for one username/password pair and
/// turns its observable behavior into a boolean.
///
/// Stateless between attempts; a shared reference can serve concurrent
/// callers since every attempt owns its process and pipes exclusively.
#[derive(Debug, Clone, Default)]
pub struct CredentialChecker {
    config: CheckerConfig,
}

impl CredentialChecker {
    pub fn new(config: CheckerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    /// Validate one username/password pair against the external tool.
    ///
    /// Always takes at least the configured minimum duration, so response
    /// latency does not reveal whether the guard, the launch, the write, the
    /// drain, or the password itself failed. Every failure collapses to
    /// `false` for the same reason.
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        let started = Instant::now();
        let verdict = match self.attempt(username, password) {
            Ok(verdict) => verdict,
            Err(error) => {
                debug!("attempt failed: {error}");
                Verdict::Invalid
            }
        };
        self.pay_remaining(started);
        verdict.is_valid()
    }

    fn attempt(&self, username: &str, password: &str) -> Result<Verdict, Error> {
        if !guard::accepts(username, self.config.max_username_len) {
            return Err(Error::InvalidUsername);
        }
        let mut handle = launch::spawn(&self.config, username)?;
        let result = self.drive(&mut handle, password);
        handle.cleanup();
        result
    }

    /// Feed the password and observe the tool's reaction. The handle stays
    /// with the caller so cleanup runs no matter how this returns.
    fn drive(&self, handle: &mut ProcessHandle, password: &str) -> Result<Verdict, Error> {
        let tick = self.config.poll_interval();
        let mut stdin = handle.take_stdin()?;
        let mut stdout = handle.take_stdout()?;
        let mut stderr = handle.take_stderr()?;

        // Give a slow tool a moment to print its password prompt. A tool
        // that never prompts is not a failure; the write goes ahead anyway.
        let cap = self.config.max_capture_bytes;
        let prompt = pipes::read_until(
            &mut stdout,
            self.config.prompt_timeout(),
            tick,
            cap,
            |text| !text.is_empty(),
        )
        .unwrap_or_default();

        let mut line = String::with_capacity(password.len() + 1);
        line.push_str(password);
        line.push('\n');
        pipes::write_with_timeout(&mut stdin, line.as_bytes(), self.config.write_timeout(), tick)?;
        // Closing stdin signals tools that read to end-of-input.
        drop(stdin);

        let mut captured = pipes::drain_until_exit(
            &mut stdout,
            &mut stderr,
            handle,
            self.config.drain_timeout(),
            tick,
            cap,
        )?;
        if !prompt.is_empty() {
            let mut full = prompt.into_bytes();
            full.extend_from_slice(&captured.stdout);
            captured.stdout = full;
        }

        let verdict = classify(
            &captured.stderr_text(),
            captured.exit_code,
            &self.config.accept_patterns,
        );
        debug!(
            "tool exited with {:?}: {} stdout bytes, {} stderr bytes, verdict {verdict:?}",
            captured.exit_code,
            captured.stdout.len(),
            captured.stderr.len()
        );
        Ok(verdict)
    }

    /// Sleep out whatever remains of the minimum attempt duration.
    fn pay_remaining(&self, started: Instant) {
        if let Some(remaining) = self.config.min_duration().checked_sub(started.elapsed()) {
            thread::sleep(remaining);
        }
    }
}

/// One-shot convenience around [`CredentialChecker`]: the default tool
/// configuration with the minimum attempt duration overridden. Callers that
/// have no opinion pass `1000`.
pub fn authenticate(username: &str, password: &str, min_duration_ms: u64) -> bool {
    let config = CheckerConfig {
        min_duration_ms,
        ..CheckerConfig::default()
    };
    CredentialChecker::new(config).authenticate(username, password)
}
