//! Prometheus-style counters for the poll loop
//!
//! Recording is a no-op until a recorder (e.g. the Prometheus exporter) is
//! installed by the binary.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Metric names
pub mod names {
    pub const OBJECTS_LISTED_TOTAL: &str = "pollster_objects_listed_total";
    pub const OBJECTS_NEW_TOTAL: &str = "pollster_objects_new_total";
    pub const LIST_ERRORS_TOTAL: &str = "pollster_list_errors_total";
    pub const NOTIFICATIONS_SENT_TOTAL: &str = "pollster_notifications_sent_total";
    pub const NOTIFICATIONS_FAILED_TOTAL: &str = "pollster_notifications_failed_total";
    pub const OBJECTS_REAPED_TOTAL: &str = "pollster_objects_reaped_total";
    pub const REAP_ERRORS_TOTAL: &str = "pollster_reap_errors_total";
    pub const ROUND_DURATION_SECONDS: &str = "pollster_round_duration_seconds";
    pub const PENDING_REAP: &str = "pollster_pending_reap_objects";
}

pub fn record_listing(listed: usize, new: usize) {
    counter!(names::OBJECTS_LISTED_TOTAL).increment(listed as u64);
    counter!(names::OBJECTS_NEW_TOTAL).increment(new as u64);
}

pub fn record_list_error() {
    counter!(names::LIST_ERRORS_TOTAL).increment(1);
}

/// `stage` is either `sign` or `deliver`
pub fn record_notification_failure(stage: &'static str) {
    counter!(names::NOTIFICATIONS_FAILED_TOTAL, "stage" => stage).increment(1);
}

pub fn record_notification_sent() {
    counter!(names::NOTIFICATIONS_SENT_TOTAL).increment(1);
}

pub fn record_reap(deleted: usize, failed: usize) {
    counter!(names::OBJECTS_REAPED_TOTAL).increment(deleted as u64);
    counter!(names::REAP_ERRORS_TOTAL).increment(failed as u64);
}

pub fn record_round(duration: Duration, pending_reap: usize) {
    histogram!(names::ROUND_DURATION_SECONDS).record(duration.as_secs_f64());
    gauge!(names::PENDING_REAP).set(pending_reap as f64);
}
