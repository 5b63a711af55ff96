use crate::state_machine::is_terminal;
use crate::types::{DeadLetterItem, DeliveryRecord};

const MS_PER_DAY: i64 = 86_400_000;

/// A delivery record is eligible for log retention cleanup once it has
/// reached a terminal status and `logRetentionDays` has elapsed since its
/// `timestamp`.
pub fn delivery_expired(record: &DeliveryRecord, now_ms: i64, log_retention_days: u32) -> bool {
    if !is_terminal(&record.status) {
        return false;
    }
    let retention_ms = (log_retention_days as i64) * MS_PER_DAY;
    now_ms - record.timestamp >= retention_ms
}

/// A dead-letter item is eligible for cleanup once `dlqRetentionDays` has
/// elapsed since the original delivery attempt.
pub fn dlq_item_expired(item: &DeadLetterItem, now_ms: i64, dlq_retention_days: u32) -> bool {
    let retention_ms = (dlq_retention_days as i64) * MS_PER_DAY;
    now_ms - item.original_timestamp >= retention_ms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeliveryStatus;
    use std::collections::HashMap;

    fn make_record(status: DeliveryStatus, timestamp: i64) -> DeliveryRecord {
        DeliveryRecord {
            endpoint_id: "ep1".to_string(),
            delivery_id: "d1".to_string(),
            status,
            timestamp,
            attempt: 1,
            dest_url: "https://example.com".to_string(),
            request_headers: HashMap::new(),
            request_body: "{}".to_string(),
            response_status: None,
            response_headers: None,
            response_body: None,
            duration_ms: None,
            error: None,
            retry_at: None,
            archived: None,
        }
    }

    fn make_dlq_item(original_timestamp: i64) -> DeadLetterItem {
        DeadLetterItem {
            endpoint_id: "ep1".to_string(),
            delivery_id: "d1".to_string(),
            original_payload: "{}".to_string(),
            original_headers: HashMap::new(),
            original_timestamp,
            attempt_count: 4,
            final_error: "timeout".to_string(),
            reason: "retries exhausted".to_string(),
        }
    }

    #[test]
    fn non_terminal_record_never_expires() {
        let record = make_record(DeliveryStatus::Pending, 0);
        assert!(!delivery_expired(&record, 100 * MS_PER_DAY, 30));
    }

    #[test]
    fn retrying_record_never_expires() {
        let record = make_record(DeliveryStatus::Retrying, 0);
        assert!(!delivery_expired(&record, 100 * MS_PER_DAY, 30));
    }

    #[test]
    fn terminal_record_expires_after_retention_window() {
        let record = make_record(DeliveryStatus::Success, 0);
        assert!(!delivery_expired(&record, 29 * MS_PER_DAY, 30));
        assert!(delivery_expired(&record, 30 * MS_PER_DAY, 30));
        assert!(delivery_expired(&record, 31 * MS_PER_DAY, 30));
    }

    #[test]
    fn failed_record_also_expires() {
        let record = make_record(DeliveryStatus::Failed, 0);
        assert!(delivery_expired(&record, 30 * MS_PER_DAY, 30));
    }

    #[test]
    fn dlq_item_expires_after_retention_window() {
        let item = make_dlq_item(0);
        assert!(!dlq_item_expired(&item, 89 * MS_PER_DAY, 90));
        assert!(dlq_item_expired(&item, 90 * MS_PER_DAY, 90));
    }

    #[test]
    fn zero_retention_expires_immediately() {
        let record = make_record(DeliveryStatus::Success, 1_000);
        assert!(delivery_expired(&record, 1_000, 0));
    }
}
