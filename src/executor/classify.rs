//! Error classification: temporary (retryable) vs. permanent (drop + alert).
//!
//! Grounded in `original_source/.../order_queue_manager.py::_classify_failure_type`
//! — a keyword match against the lower-cased error string, central to one
//! function so every call site applies the identical policy.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Temporary,
    Permanent,
}

const TEMPORARY_KEYWORDS: &[&str] = &[
    "rate limit",
    "too many",
    "throttle",
    "timeout",
    "network",
    "connection",
];

const PERMANENT_KEYWORDS: &[&str] = &[
    "balance",
    "insufficient",
    "funds",
    "invalid symbol",
    "unknown symbol",
    "exceeds",
];

/// Classifies an exchange error message. Anything matching neither keyword
/// list defaults to `Temporary` — fail open toward a retry rather than a
/// silent drop, matching the original's default branch.
pub fn classify(message: &str) -> FailureKind {
    let lower = message.to_lowercase();
    if PERMANENT_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return FailureKind::Permanent;
    }
    if TEMPORARY_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return FailureKind::Temporary;
    }
    FailureKind::Temporary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_is_temporary() {
        assert_eq!(classify("Rate limit exceeded, retry later"), FailureKind::Temporary);
    }

    #[test]
    fn insufficient_balance_is_permanent() {
        assert_eq!(classify("Account has insufficient balance"), FailureKind::Permanent);
    }

    #[test]
    fn invalid_symbol_is_permanent() {
        assert_eq!(classify("Invalid symbol: XYZUSDT"), FailureKind::Permanent);
    }

    #[test]
    fn unrecognized_message_defaults_to_temporary() {
        assert_eq!(classify("upstream returned 500"), FailureKind::Temporary);
    }

    #[test]
    fn permanent_keyword_wins_over_temporary_when_both_present() {
        // "connection" (temporary) and "insufficient" (permanent) both
        // appear; permanent is checked first and should win, matching the
        // original's branch order.
        assert_eq!(
            classify("connection reset while checking insufficient funds"),
            FailureKind::Permanent
        );
    }
}
