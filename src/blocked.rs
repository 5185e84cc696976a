//! Halt detection on episode summaries.
//!
//! The agent is instructed to answer `BLOCKED:<reason>` when it hits a
//! captcha, login wall, or paywall. Matching that convention is a string
//! heuristic on model output; everything that depends on it goes through this
//! one function.

const BLOCKED_PREFIX: &str = "blocked:";

/// Returns the reason when `summary` starts with the blocked marker
/// (case-insensitive), `None` otherwise. A blocked summary is a successful
/// but terminal outcome for the run, not an error.
pub fn blocked_reason(summary: &str) -> Option<&str> {
    let trimmed = summary.trim_start();
    let head = trimmed.get(..BLOCKED_PREFIX.len())?;
    if head.eq_ignore_ascii_case(BLOCKED_PREFIX) {
        Some(trimmed[BLOCKED_PREFIX.len()..].trim())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::blocked_reason;

    #[test]
    fn detects_prefix_case_insensitively() {
        assert_eq!(blocked_reason("BLOCKED: captcha wall"), Some("captcha wall"));
        assert_eq!(blocked_reason("blocked:login required"), Some("login required"));
        assert_eq!(blocked_reason("Blocked:  paywall  "), Some("paywall"));
    }

    #[test]
    fn ignores_mentions_past_the_start() {
        assert!(blocked_reason("the page said BLOCKED: nope").is_none());
        assert!(blocked_reason("completed the search").is_none());
        assert!(blocked_reason("").is_none());
    }

    #[test]
    fn tolerates_leading_whitespace() {
        assert_eq!(blocked_reason("  BLOCKED: rate gate"), Some("rate gate"));
    }
}
