use crate::types::{DeliveryRecord, DeliveryStatus};

/// A single filter predicate over a [`DeliveryRecord`]. A query composes zero
/// or more of these by conjunction (all must match).
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryFilter {
    DateRange { from: Option<i64>, to: Option<i64> },
    Status(Vec<DeliveryStatus>),
    StatusCodes(Vec<u16>),
    Duration { min_ms: Option<u64>, max_ms: Option<u64> },
    AttemptCount { min: Option<u32>, max: Option<u32> },
    HasError(bool),
    Search(String),
    All(Vec<DeliveryFilter>),
}

impl DeliveryFilter {
    pub fn none() -> Self {
        DeliveryFilter::All(Vec::new())
    }
}

fn satisfies_min<T: PartialOrd>(value: T, min: &Option<T>) -> bool {
    match min {
        None => true,
        Some(m) => value >= *m,
    }
}

fn satisfies_max<T: PartialOrd>(value: T, max: &Option<T>) -> bool {
    match max {
        None => true,
        Some(m) => value <= *m,
    }
}

/// Returns `true` if `record` satisfies `filter`.
pub fn matches_filter(record: &DeliveryRecord, filter: &DeliveryFilter) -> bool {
    match filter {
        DeliveryFilter::DateRange { from, to } => {
            satisfies_min(record.timestamp, from) && satisfies_max(record.timestamp, to)
        }
        DeliveryFilter::Status(statuses) => statuses.contains(&record.status),
        DeliveryFilter::StatusCodes(codes) => record
            .response_status
            .is_some_and(|s| codes.contains(&s)),
        DeliveryFilter::Duration { min_ms, max_ms } => match record.duration_ms {
            None => false,
            Some(d) => satisfies_min(d, min_ms) && satisfies_max(d, max_ms),
        },
        DeliveryFilter::AttemptCount { min, max } => {
            satisfies_min(record.attempt, min) && satisfies_max(record.attempt, max)
        }
        DeliveryFilter::HasError(want) => record.error.is_some() == *want,
        DeliveryFilter::Search(needle) => {
            let needle = needle.to_lowercase();
            record.delivery_id.to_lowercase().contains(&needle)
                || record.endpoint_id.to_lowercase().contains(&needle)
        }
        DeliveryFilter::All(predicates) => predicates.iter().all(|p| matches_filter(record, p)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn make_record() -> DeliveryRecord {
        DeliveryRecord {
            endpoint_id: "ep1".to_string(),
            delivery_id: "01ARZ3DEADBEEF".to_string(),
            status: crate::types::DeliveryStatus::Success,
            timestamp: 1_700_000_000_000,
            attempt: 2,
            dest_url: "https://example.com".to_string(),
            request_headers: HashMap::new(),
            request_body: "{}".to_string(),
            response_status: Some(200),
            response_headers: None,
            response_body: None,
            duration_ms: Some(150),
            error: None,
            retry_at: None,
            archived: None,
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(matches_filter(&make_record(), &DeliveryFilter::none()));
    }

    #[test]
    fn date_range_inclusive_bounds() {
        let record = make_record();
        assert!(matches_filter(
            &record,
            &DeliveryFilter::DateRange {
                from: Some(record.timestamp),
                to: Some(record.timestamp)
            }
        ));
        assert!(!matches_filter(
            &record,
            &DeliveryFilter::DateRange {
                from: Some(record.timestamp + 1),
                to: None
            }
        ));
    }

    #[test]
    fn status_matches_discrete_set() {
        let record = make_record();
        assert!(matches_filter(
            &record,
            &DeliveryFilter::Status(vec![DeliveryStatus::Success, DeliveryStatus::Retrying])
        ));
        assert!(!matches_filter(
            &record,
            &DeliveryFilter::Status(vec![DeliveryStatus::Failed])
        ));
    }

    #[test]
    fn status_codes_matches_discrete_set() {
        let record = make_record();
        assert!(matches_filter(
            &record,
            &DeliveryFilter::StatusCodes(vec![200, 201])
        ));
        assert!(!matches_filter(
            &record,
            &DeliveryFilter::StatusCodes(vec![404, 500])
        ));
    }

    #[test]
    fn status_codes_with_no_response_never_matches() {
        let mut record = make_record();
        record.response_status = None;
        assert!(!matches_filter(
            &record,
            &DeliveryFilter::StatusCodes(vec![200])
        ));
    }

    #[test]
    fn duration_range() {
        let record = make_record();
        assert!(matches_filter(
            &record,
            &DeliveryFilter::Duration {
                min_ms: Some(100),
                max_ms: Some(200)
            }
        ));
        assert!(!matches_filter(
            &record,
            &DeliveryFilter::Duration {
                min_ms: Some(151),
                max_ms: None
            }
        ));
    }

    #[test]
    fn duration_with_no_duration_never_matches_a_bound() {
        let mut record = make_record();
        record.duration_ms = None;
        assert!(!matches_filter(
            &record,
            &DeliveryFilter::Duration {
                min_ms: Some(0),
                max_ms: None
            }
        ));
    }

    #[test]
    fn attempt_count_range() {
        let record = make_record();
        assert!(matches_filter(
            &record,
            &DeliveryFilter::AttemptCount {
                min: Some(1),
                max: Some(3)
            }
        ));
        assert!(!matches_filter(
            &record,
            &DeliveryFilter::AttemptCount {
                min: Some(3),
                max: None
            }
        ));
    }

    #[test]
    fn has_error_true_and_false() {
        let mut record = make_record();
        assert!(matches_filter(&record, &DeliveryFilter::HasError(false)));
        record.error = Some("boom".to_string());
        assert!(matches_filter(&record, &DeliveryFilter::HasError(true)));
        assert!(!matches_filter(&record, &DeliveryFilter::HasError(false)));
    }

    #[test]
    fn search_matches_delivery_id_case_insensitively() {
        let record = make_record();
        assert!(matches_filter(
            &record,
            &DeliveryFilter::Search("deadbeef".to_string())
        ));
        assert!(matches_filter(
            &record,
            &DeliveryFilter::Search("EP1".to_string())
        ));
        assert!(!matches_filter(
            &record,
            &DeliveryFilter::Search("nomatch".to_string())
        ));
    }

    #[test]
    fn all_conjoins_predicates() {
        let record = make_record();
        let filter = DeliveryFilter::All(vec![
            DeliveryFilter::StatusCodes(vec![200]),
            DeliveryFilter::HasError(false),
        ]);
        assert!(matches_filter(&record, &filter));

        let filter_fails = DeliveryFilter::All(vec![
            DeliveryFilter::StatusCodes(vec![200]),
            DeliveryFilter::HasError(true),
        ]);
        assert!(!matches_filter(&record, &filter_fails));
    }
}
