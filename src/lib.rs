//! krbgate — validate a username/password pair by driving an external
//! kinit-style tool over pipes and classifying what it prints.
//!
//! The engine spawns the tool with a minimal ticket lifetime pointed at a
//! discard destination, writes the password to its stdin under a timeout,
//! drains stdout and stderr by readiness polling until exit, and maps known
//! stderr responses plus the exit code to a boolean. Every attempt pays a
//! configurable minimum wall-clock duration so callers cannot tell failure
//! modes apart by latency, and every attempt releases its process and pipes
//! on every path. Unix only.
//!
//! ```no_run
//! use krbgate::{CheckerConfig, CredentialChecker};
//!
//! let checker = CredentialChecker::new(CheckerConfig::default());
//! let valid = checker.authenticate("alice@EXAMPLE.COM", "hunter2");
//! ```

pub mod checker;
pub mod classify;
pub mod config;
pub mod error;
pub mod guard;
pub mod launch;
pub mod pipes;
pub mod session;

pub use checker::{CredentialChecker, authenticate};
pub use classify::{Verdict, classify};
pub use config::CheckerConfig;
pub use error::Error;
pub use launch::ProcessHandle;
pub use pipes::CapturedOutput;
pub use session::SessionStore;
