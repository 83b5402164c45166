//! Verdict classification of the tool's stderr text and exit code.
//!
//! The tool's response protocol is undocumented, so this stays a small
//! substring heuristic against known responses rather than a parser. The
//! accept table lives in configuration so new tool versions or locales can
//! be accommodated without touching the polling logic.

use log::debug;

/// Final, immutable result of one authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid,
}

impl Verdict {
    pub const fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Classify captured stderr and exit code, in order:
///
/// 1. stderr contains an accept pattern — the tool verified the password and
///    only then failed to write the ticket to the discard destination, so
///    the complaint is a positive signal.
/// 2. empty stderr — valid exactly when the tool exited 0.
/// 3. anything else — invalid. Unrecognized text from a newer tool version
///    is rejected rather than trusted.
///
/// Patterns are plain substrings, first match wins; empty patterns are
/// ignored.
pub fn classify(stderr_text: &str, exit_code: Option<i32>, accept_patterns: &[String]) -> Verdict {
    if let Some(pattern) = accept_patterns
        .iter()
        .filter(|p| !p.is_empty())
        .find(|p| stderr_text.contains(p.as_str()))
    {
        debug!("stderr matched accept pattern {pattern:?}");
        return Verdict::Valid;
    }
    if stderr_text.is_empty() {
        return if exit_code == Some(0) {
            Verdict::Valid
        } else {
            Verdict::Invalid
        };
    }
    debug!(
        "unrecognized stderr ({} bytes, exit {exit_code:?})",
        stderr_text.len()
    );
    Verdict::Invalid
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> Vec<String> {
        vec![
            "Permission denied".to_string(),
            "No such file or directory".to_string(),
        ]
    }

    // --- accept patterns ---

    #[test]
    fn permission_denied_with_failure_exit_is_valid() {
        let verdict = classify(
            "kinit: Permission denied while getting initial credentials\n",
            Some(1),
            &patterns(),
        );
        assert_eq!(verdict, Verdict::Valid);
    }

    #[test]
    fn missing_cache_destination_is_valid() {
        let verdict = classify(
            "kinit: No such file or directory when resolving credential cache\n",
            Some(1),
            &patterns(),
        );
        assert_eq!(verdict, Verdict::Valid);
    }

    #[test]
    fn pattern_match_wins_over_exit_code() {
        let verdict = classify("Permission denied", None, &patterns());
        assert_eq!(verdict, Verdict::Valid);
    }

    #[test]
    fn empty_patterns_are_ignored() {
        let patterns = vec![String::new()];
        assert_eq!(classify("anything at all", Some(0), &patterns), Verdict::Invalid);
    }

    // --- empty stderr ---

    #[test]
    fn silent_success_is_valid() {
        assert_eq!(classify("", Some(0), &patterns()), Verdict::Valid);
    }

    #[test]
    fn silent_failure_is_invalid() {
        assert_eq!(classify("", Some(1), &patterns()), Verdict::Invalid);
    }

    #[test]
    fn silent_without_observed_exit_is_invalid() {
        assert_eq!(classify("", None, &patterns()), Verdict::Invalid);
    }

    // --- fail closed ---

    #[test]
    fn unrecognized_stderr_is_invalid_even_on_exit_zero() {
        let verdict = classify("warning: ticket renewal unavailable\n", Some(0), &patterns());
        assert_eq!(verdict, Verdict::Invalid);
    }

    #[test]
    fn wrong_password_response_is_invalid() {
        let verdict = classify(
            "kinit: Password incorrect while getting initial credentials\n",
            Some(1),
            &patterns(),
        );
        assert_eq!(verdict, Verdict::Invalid);
    }
}
