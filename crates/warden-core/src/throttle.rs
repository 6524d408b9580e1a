use chrono::{DateTime, Duration, Utc};
use warden_db::login_attempts::LoginAttemptRow;

/// Attempts older than this play no part in the decision.
pub const FAILURE_WINDOW_SECONDS: i64 = 5 * 60;
/// Only the newest rows inside the window are consulted.
pub const MAX_TRACKED_ATTEMPTS: i64 = 5;

const FAILURE_THRESHOLD: usize = 3;
const BACKOFF_STEP_SECONDS: i64 = 5;
const MAX_BACKOFF_SECONDS: i64 = 120;

pub fn window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::seconds(FAILURE_WINDOW_SECONDS)
}

/// Remaining wait in seconds, or `None` when the attempt may proceed to
/// credential verification. `attempts` must be ordered newest first, as
/// returned by the attempt-window query.
///
/// This is a read-then-decide gate with no exclusive lock: concurrent
/// attempts can both observe a stale allow. The bound is probabilistic
/// throttling, not hard exclusion.
pub fn retry_delay(attempts: &[LoginAttemptRow], now: DateTime<Utc>) -> Option<i64> {
    let failures: Vec<&LoginAttemptRow> = attempts.iter().filter(|a| !a.success).collect();
    if failures.len() < FAILURE_THRESHOLD {
        return None;
    }

    let backoff = MAX_BACKOFF_SECONDS.min(failures.len() as i64 * BACKOFF_STEP_SECONDS);
    let since_last_failure = (now - failures[0].created_at).num_seconds();
    if since_last_failure < backoff {
        Some(backoff - since_last_failure)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(success: bool, seconds_ago: i64, now: DateTime<Utc>) -> LoginAttemptRow {
        LoginAttemptRow {
            id: format!("a-{seconds_ago}"),
            email: "x@example.com".into(),
            user_id: None,
            ip: None,
            user_agent: None,
            success,
            created_at: now - Duration::seconds(seconds_ago),
        }
    }

    #[test]
    fn fewer_than_three_failures_never_throttle() {
        let now = Utc::now();
        let attempts = vec![attempt(false, 1, now), attempt(false, 2, now)];
        assert_eq!(retry_delay(&attempts, now), None);
        assert_eq!(retry_delay(&[], now), None);
    }

    #[test]
    fn three_fresh_failures_impose_a_fifteen_second_backoff() {
        let now = Utc::now();
        let attempts = vec![
            attempt(false, 5, now),
            attempt(false, 10, now),
            attempt(false, 20, now),
        ];
        // Newest failure was 5s ago, backoff is 3 * 5 = 15s.
        assert_eq!(retry_delay(&attempts, now), Some(10));
    }

    #[test]
    fn backoff_clears_once_the_wait_has_elapsed() {
        let now = Utc::now();
        let attempts = vec![
            attempt(false, 16, now),
            attempt(false, 30, now),
            attempt(false, 40, now),
        ];
        assert_eq!(retry_delay(&attempts, now), None);
    }

    #[test]
    fn successes_do_not_count_toward_the_threshold() {
        let now = Utc::now();
        let attempts = vec![
            attempt(true, 1, now),
            attempt(false, 2, now),
            attempt(false, 3, now),
            attempt(true, 4, now),
            attempt(false, 5, now),
        ];
        // Three failures among five rows, newest failure 2s ago: 15 - 2 = 13.
        assert_eq!(retry_delay(&attempts, now), Some(13));
    }

    #[test]
    fn backoff_grows_with_the_failure_count() {
        let now = Utc::now();
        let attempts: Vec<LoginAttemptRow> =
            (0..5i64).map(|i| attempt(false, i + 1, now)).collect();
        // Five failures -> min(120, 25) = 25s from the newest (1s ago).
        assert_eq!(retry_delay(&attempts, now), Some(24));
    }
}
