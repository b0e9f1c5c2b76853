// ABOUTME: Metric names and recording helpers for logons, reconnects, events, and steps
// ABOUTME: Uses the `metrics` facade; installing a recorder is up to the embedding process

use std::time::Duration;

pub const LOGONS_TOTAL: &str = "convoy_logons_total";
pub const RECONNECTS_TOTAL: &str = "convoy_reconnects_total";
pub const EVENTS_TOTAL: &str = "convoy_events_total";
pub const STEPS_TOTAL: &str = "convoy_steps_total";
pub const STEP_DURATION_SECONDS: &str = "convoy_step_duration_seconds";

/// Record a logon attempt outcome ("success" / "failure")
pub fn record_logon(result: &'static str) {
    metrics::counter!(LOGONS_TOTAL, "result" => result).increment(1);
}

/// Record a reconnect trigger ("disconnected" / "renew_token_error")
pub fn record_reconnect(reason: &'static str) {
    metrics::counter!(RECONNECTS_TOTAL, "reason" => reason).increment(1);
}

pub fn record_event(kind: &'static str) {
    metrics::counter!(EVENTS_TOTAL, "kind" => kind).increment(1);
}

/// Record a finished step ("success" / "failure" / "timeout") and its duration
pub fn record_step(result: &'static str, duration: Duration) {
    metrics::counter!(STEPS_TOTAL, "result" => result).increment(1);
    metrics::histogram!(STEP_DURATION_SECONDS).record(duration.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_logon("success");
        record_reconnect("disconnected");
        record_event("item_added");
        record_step("success", Duration::from_millis(5));
    }
}
