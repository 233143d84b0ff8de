//! Condition management helpers with heartbeat tracking
//!
//! Every condition carries two timestamps: `lastHeartbeatTime` moves on every
//! write, `lastTransitionTime` only when the status flips.

use chrono::Utc;
use tracing::{debug, warn};

use super::nrt_client::NrtClient;
use crate::crd::{ConditionStatus, ExtendedCondition, NodeRoutingTable};

/// The single condition type the agent maintains
pub const CONDITION_TYPE_RECONCILIATION_SUCCEED: &str = "ReconciliationSucceed";

pub const REASON_PENDING: &str = "Pending";
pub const REASON_SUCCEED: &str = "Succeed";
pub const REASON_FAILED: &str = "Failed";

fn now() -> String {
    Utc::now().to_rfc3339()
}

/// Insert or merge `new` into `conditions`; returns whether anything but the heartbeat changed
pub fn set_condition(conditions: &mut Vec<ExtendedCondition>, new: ExtendedCondition) -> bool {
    let Some(index) = conditions.iter().position(|c| c.type_ == new.type_) else {
        let mut new = new;
        if new.last_transition_time.is_none() {
            new.last_transition_time = Some(now());
        }
        if new.last_heartbeat_time.is_none() {
            new.last_heartbeat_time = Some(now());
        }
        conditions.push(new);
        return true;
    };

    let existing = &mut conditions[index];
    let mut changed = false;
    existing.last_heartbeat_time = Some(new.last_heartbeat_time.unwrap_or_else(now));

    if existing.status != new.status {
        existing.status = new.status;
        existing.last_transition_time = Some(new.last_transition_time.unwrap_or_else(now));
        changed = true;
    }
    if existing.reason != new.reason {
        existing.reason = new.reason;
        changed = true;
    }
    if existing.message != new.message {
        existing.message = new.message;
        changed = true;
    }
    changed
}

/// Find a condition by type
pub fn find_condition<'a>(
    conditions: &'a [ExtendedCondition],
    type_: &str,
) -> Option<&'a ExtendedCondition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Check if a condition is true
pub fn is_condition_true(conditions: &[ExtendedCondition], type_: &str) -> bool {
    find_condition(conditions, type_)
        .map(|c| c.status == ConditionStatus::True)
        .unwrap_or(false)
}

fn reconciliation_condition(
    status: ConditionStatus,
    reason: &str,
    message: impl Into<String>,
) -> ExtendedCondition {
    ExtendedCondition {
        type_: CONDITION_TYPE_RECONCILIATION_SUCCEED.to_string(),
        status,
        reason: reason.to_string(),
        message: message.into(),
        last_transition_time: None,
        last_heartbeat_time: None,
    }
}

/// ReconciliationSucceed=False, reason Pending
pub fn pending_condition() -> ExtendedCondition {
    reconciliation_condition(ConditionStatus::False, REASON_PENDING, "")
}

/// ReconciliationSucceed=True, reason Succeed
pub fn succeed_condition() -> ExtendedCondition {
    reconciliation_condition(ConditionStatus::True, REASON_SUCCEED, "")
}

/// ReconciliationSucceed=False, reason Failed
pub fn failed_condition(message: impl Into<String>) -> ExtendedCondition {
    reconciliation_condition(ConditionStatus::False, REASON_FAILED, message)
}

/// Mark `nrt` Pending at its current generation and persist the status
///
/// Failures are logged and otherwise ignored.
pub async fn set_pending(client: &dyn NrtClient, nrt: &mut NodeRoutingTable) {
    let generation = nrt.generation();
    let status = nrt.status.get_or_insert_with(Default::default);
    status.observed_generation = Some(generation);
    set_condition(&mut status.conditions, pending_condition());

    match client.update_status(nrt).await {
        Ok(()) => debug!(generation, "Marked NRT as pending"),
        Err(e) => warn!("Unable to mark NRT as pending: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamped(
        status: ConditionStatus,
        reason: &str,
        transition: &str,
        heartbeat: &str,
    ) -> ExtendedCondition {
        ExtendedCondition {
            type_: CONDITION_TYPE_RECONCILIATION_SUCCEED.to_string(),
            status,
            reason: reason.to_string(),
            message: String::new(),
            last_transition_time: Some(transition.to_string()),
            last_heartbeat_time: Some(heartbeat.to_string()),
        }
    }

    #[test]
    fn test_set_condition_adds_new_with_timestamps() {
        let mut conditions = Vec::new();
        assert!(set_condition(&mut conditions, pending_condition()));

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].reason, REASON_PENDING);
        assert!(conditions[0].last_transition_time.is_some());
        assert!(conditions[0].last_heartbeat_time.is_some());
    }

    #[test]
    fn test_set_condition_same_status_only_moves_heartbeat() {
        let mut conditions = vec![stamped(
            ConditionStatus::True,
            REASON_SUCCEED,
            "2024-01-01T00:00:00+00:00",
            "2024-01-01T00:00:00+00:00",
        )];

        let changed = set_condition(&mut conditions, succeed_condition());

        assert!(!changed);
        assert_eq!(
            conditions[0].last_transition_time.as_deref(),
            Some("2024-01-01T00:00:00+00:00")
        );
        assert_ne!(
            conditions[0].last_heartbeat_time.as_deref(),
            Some("2024-01-01T00:00:00+00:00")
        );
    }

    #[test]
    fn test_set_condition_status_flip_moves_transition_time() {
        let mut conditions = vec![stamped(
            ConditionStatus::False,
            REASON_PENDING,
            "2024-01-01T00:00:00+00:00",
            "2024-01-01T00:00:00+00:00",
        )];

        assert!(set_condition(&mut conditions, succeed_condition()));
        assert_eq!(conditions[0].status, ConditionStatus::True);
        assert_eq!(conditions[0].reason, REASON_SUCCEED);
        assert_ne!(
            conditions[0].last_transition_time.as_deref(),
            Some("2024-01-01T00:00:00+00:00")
        );
    }

    #[test]
    fn test_set_condition_reason_change_keeps_transition_time() {
        let mut conditions = vec![stamped(
            ConditionStatus::False,
            REASON_PENDING,
            "2024-01-01T00:00:00+00:00",
            "2024-01-01T00:00:00+00:00",
        )];

        assert!(set_condition(&mut conditions, failed_condition("boom")));
        assert_eq!(conditions[0].reason, REASON_FAILED);
        assert_eq!(conditions[0].message, "boom");
        assert_eq!(
            conditions[0].last_transition_time.as_deref(),
            Some("2024-01-01T00:00:00+00:00")
        );
    }

    #[test]
    fn test_explicit_timestamps_are_honoured() {
        let mut conditions = vec![stamped(
            ConditionStatus::False,
            REASON_PENDING,
            "2024-01-01T00:00:00+00:00",
            "2024-01-01T00:00:00+00:00",
        )];
        let mut new = succeed_condition();
        new.last_transition_time = Some("2024-02-02T00:00:00+00:00".to_string());
        new.last_heartbeat_time = Some("2024-02-03T00:00:00+00:00".to_string());

        set_condition(&mut conditions, new);
        assert_eq!(
            conditions[0].last_transition_time.as_deref(),
            Some("2024-02-02T00:00:00+00:00")
        );
        assert_eq!(
            conditions[0].last_heartbeat_time.as_deref(),
            Some("2024-02-03T00:00:00+00:00")
        );
    }

    #[test]
    fn test_is_condition_true() {
        let mut conditions = Vec::new();
        assert!(!is_condition_true(
            &conditions,
            CONDITION_TYPE_RECONCILIATION_SUCCEED
        ));

        set_condition(&mut conditions, succeed_condition());
        assert!(is_condition_true(
            &conditions,
            CONDITION_TYPE_RECONCILIATION_SUCCEED
        ));
        assert!(find_condition(&conditions, "Ready").is_none());
    }
}
