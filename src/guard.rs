//! Username allow-list, applied before any process is spawned.

/// Returns `true` when `username` is non-empty, at most `max_len` bytes, and
/// built only from characters in `[A-Za-z0-9+._,@-]`.
///
/// The class is matched case-sensitively; both letter cases are allowed and
/// nothing outside ASCII is. The username ends up in the external tool's
/// argument vector, so anything else is rejected outright rather than
/// escaped. A rejected username costs no subprocess.
pub fn accepts(username: &str, max_len: usize) -> bool {
    if username.is_empty() || username.len() > max_len {
        return false;
    }
    username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '_' | ',' | '@' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 64;

    // --- accepted shapes ---

    #[test]
    fn plain_name_is_accepted() {
        assert!(accepts("alice", MAX));
    }

    #[test]
    fn principal_with_realm_is_accepted() {
        assert!(accepts("alice@EXAMPLE.COM", MAX));
    }

    #[test]
    fn full_punctuation_set_is_accepted() {
        assert!(accepts("a+b.c_d,e@f-g", MAX));
    }

    #[test]
    fn both_letter_cases_and_digits_are_accepted() {
        assert!(accepts("Alice2Bob9", MAX));
    }

    #[test]
    fn length_boundary_is_inclusive() {
        let name = "a".repeat(MAX);
        assert!(accepts(&name, MAX));
        assert!(!accepts(&format!("{name}a"), MAX));
    }

    // --- rejected shapes ---

    #[test]
    fn empty_is_rejected() {
        assert!(!accepts("", MAX));
    }

    #[test]
    fn whitespace_is_rejected() {
        assert!(!accepts("alice bob", MAX));
        assert!(!accepts(" alice", MAX));
        assert!(!accepts("alice\n", MAX));
    }

    #[test]
    fn shell_metacharacters_are_rejected() {
        for name in ["alice;id", "alice&&id", "alice|id", "$(id)", "`id`", "alice'"] {
            assert!(!accepts(name, MAX), "{name} should be rejected");
        }
    }

    #[test]
    fn path_traversal_is_rejected() {
        assert!(!accepts("../etc/passwd", MAX));
    }

    #[test]
    fn non_ascii_is_rejected() {
        assert!(!accepts("über", MAX));
        assert!(!accepts("алиса", MAX));
    }
}
