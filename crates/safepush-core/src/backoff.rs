use std::time::Duration;

/// Attempts made to create a prediction before giving up on transient errors.
pub const CREATE_ATTEMPTS: u32 = 3;

/// Pure backoff policy for retrying prediction creation.
///
/// Attempt 1: immediate
/// Attempt 2: 500ms
/// Attempt 3+: 2s
pub fn create_backoff(attempt_number: u32) -> Duration {
    match attempt_number {
        0 | 1 => Duration::ZERO,
        2 => Duration::from_millis(500),
        _ => Duration::from_secs(2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_backoff_schedule() {
        assert_eq!(create_backoff(1), Duration::ZERO);
        assert_eq!(create_backoff(2), Duration::from_millis(500));
        assert_eq!(create_backoff(3), Duration::from_secs(2));
        assert_eq!(create_backoff(9), Duration::from_secs(2));
    }
}
