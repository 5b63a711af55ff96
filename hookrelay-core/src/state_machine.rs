use crate::types::DeliveryStatus;

pub const TERMINAL_STATUSES: &[DeliveryStatus] =
    &[DeliveryStatus::Success, DeliveryStatus::Failed];

pub fn allowed_transitions(from: &DeliveryStatus) -> &'static [DeliveryStatus] {
    match from {
        DeliveryStatus::Pending => &[
            DeliveryStatus::Retrying,
            DeliveryStatus::Success,
            DeliveryStatus::Failed,
        ],
        DeliveryStatus::Retrying => &[DeliveryStatus::Retrying, DeliveryStatus::Success, DeliveryStatus::Failed],
        DeliveryStatus::Success | DeliveryStatus::Failed => &[],
    }
}

pub fn can_transition(from: &DeliveryStatus, to: &DeliveryStatus) -> bool {
    if from == to && *from != DeliveryStatus::Retrying {
        return false;
    }
    allowed_transitions(from).contains(to)
}

pub fn apply_transition(
    from: &DeliveryStatus,
    to: DeliveryStatus,
) -> Result<DeliveryStatus, String> {
    if !can_transition(from, &to) {
        return Err(format!("Invalid transition: {:?} \u{2192} {:?}", from, to));
    }
    Ok(to)
}

pub fn is_terminal(status: &DeliveryStatus) -> bool {
    TERMINAL_STATUSES.contains(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_to_retrying_is_valid() {
        assert!(can_transition(&DeliveryStatus::Pending, &DeliveryStatus::Retrying));
    }

    #[test]
    fn pending_to_success_is_valid() {
        assert!(can_transition(&DeliveryStatus::Pending, &DeliveryStatus::Success));
    }

    #[test]
    fn pending_to_failed_is_valid() {
        assert!(can_transition(&DeliveryStatus::Pending, &DeliveryStatus::Failed));
    }

    #[test]
    fn retrying_to_retrying_is_valid_for_repeated_attempts() {
        assert!(can_transition(&DeliveryStatus::Retrying, &DeliveryStatus::Retrying));
    }

    #[test]
    fn retrying_to_success_is_valid() {
        assert!(can_transition(&DeliveryStatus::Retrying, &DeliveryStatus::Success));
    }

    #[test]
    fn retrying_to_failed_is_valid() {
        assert!(can_transition(&DeliveryStatus::Retrying, &DeliveryStatus::Failed));
    }

    #[test]
    fn pending_to_pending_is_invalid() {
        assert!(!can_transition(&DeliveryStatus::Pending, &DeliveryStatus::Pending));
    }

    #[test]
    fn terminal_states_cannot_transition() {
        for to in [
            DeliveryStatus::Pending,
            DeliveryStatus::Retrying,
            DeliveryStatus::Success,
            DeliveryStatus::Failed,
        ] {
            assert!(!can_transition(&DeliveryStatus::Success, &to));
            assert!(!can_transition(&DeliveryStatus::Failed, &to));
        }
    }

    #[test]
    fn is_terminal_matches_success_and_failed_only() {
        assert!(!is_terminal(&DeliveryStatus::Pending));
        assert!(!is_terminal(&DeliveryStatus::Retrying));
        assert!(is_terminal(&DeliveryStatus::Success));
        assert!(is_terminal(&DeliveryStatus::Failed));
    }

    #[test]
    fn apply_transition_success_case() {
        let result = apply_transition(&DeliveryStatus::Pending, DeliveryStatus::Retrying);
        assert_eq!(result.unwrap(), DeliveryStatus::Retrying);
    }

    #[test]
    fn apply_transition_from_terminal_errors() {
        let result = apply_transition(&DeliveryStatus::Success, DeliveryStatus::Retrying);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("Invalid transition"));
    }

    #[test]
    fn allowed_transitions_from_pending_has_three_targets() {
        let t = allowed_transitions(&DeliveryStatus::Pending);
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn allowed_transitions_from_terminal_are_empty() {
        assert!(allowed_transitions(&DeliveryStatus::Success).is_empty());
        assert!(allowed_transitions(&DeliveryStatus::Failed).is_empty());
    }
}
