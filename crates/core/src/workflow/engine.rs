use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::requisition::RequisitionStatus;
use crate::workflow::states::{RequisitionEvent, TransitionOutcome};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("requisition in status `{from}` {}", .event.rejection_hint())]
    InvalidTransition { from: RequisitionStatus, event: RequisitionEvent },
    /// The stored status moved between the read and the conditional write.
    #[error(
        "requisition changed from `{expected}` to `{found}` while `{}` was being applied; reload and retry",
        .event.as_str()
    )]
    ConcurrentUpdate {
        expected: RequisitionStatus,
        found: RequisitionStatus,
        event: RequisitionEvent,
    },
}

/// The requisition lifecycle graph. Every pair not listed is rejected, so a
/// status can be consumed by at most one transition.
pub fn transition(
    current: RequisitionStatus,
    event: RequisitionEvent,
) -> Result<TransitionOutcome, TransitionError> {
    use RequisitionEvent::{
        Allocated, HrApproved, HrRejected, ManagerApproved, ManagerHeld, ManagerRejected,
        Withdrawn,
    };
    use RequisitionStatus as S;

    let to = match (current, event) {
        (S::Pending, ManagerApproved) | (S::OnHold, ManagerApproved) => Some(S::ManagerApproved),
        (S::Pending, ManagerRejected) | (S::OnHold, ManagerRejected) => Some(S::ManagerRejected),
        (S::Pending, ManagerHeld) => Some(S::OnHold),
        (S::ManagerApproved, HrApproved) => Some(S::HrApproved),
        (S::ManagerApproved, HrRejected) => Some(S::HrRejected),
        (S::HrApproved, Allocated) => Some(S::Allocated),
        (S::Pending, Withdrawn) | (S::OnHold, Withdrawn) | (S::ManagerApproved, Withdrawn) => None,
        _ => return Err(TransitionError::InvalidTransition { from: current, event }),
    };

    Ok(TransitionOutcome { from: current, to, event })
}

#[derive(Clone, Debug, Default)]
pub struct WorkflowEngine;

impl WorkflowEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn apply(
        &self,
        current: RequisitionStatus,
        event: RequisitionEvent,
    ) -> Result<TransitionOutcome, TransitionError> {
        transition(current, event)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: RequisitionStatus,
        event: RequisitionEvent,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, TransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit.requisition_id.clone(),
                        audit.correlation_id.clone(),
                        "requisition.transition_applied",
                        AuditCategory::Workflow,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.map_or("deleted", |status| status.as_str()))
                    .with_metadata("event", outcome.event.as_str()),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.requisition_id.clone(),
                        audit.correlation_id.clone(),
                        "requisition.transition_rejected",
                        AuditCategory::Workflow,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::requisition::{RequisitionId, RequisitionStatus};
    use crate::workflow::engine::{transition, TransitionError, WorkflowEngine};
    use crate::workflow::states::{HrAction, ManagerAction, RequisitionEvent};

    #[test]
    fn manager_then_hr_approval_path() {
        let engine = WorkflowEngine::new();

        let approved = engine
            .apply(RequisitionStatus::Pending, ManagerAction::Approve.event())
            .expect("pending -> manager approved");
        assert_eq!(approved.to, Some(RequisitionStatus::ManagerApproved));

        let hr = engine
            .apply(RequisitionStatus::ManagerApproved, HrAction::Approve.event())
            .expect("manager approved -> hr approved");
        assert_eq!(hr.to, Some(RequisitionStatus::HrApproved));

        let allocated = engine
            .apply(RequisitionStatus::HrApproved, RequisitionEvent::Allocated)
            .expect("hr approved -> allocated");
        assert_eq!(allocated.to, Some(RequisitionStatus::Allocated));
    }

    #[test]
    fn held_requisitions_remain_manager_actionable() {
        let held = transition(RequisitionStatus::Pending, RequisitionEvent::ManagerHeld)
            .expect("pending -> on hold");
        assert_eq!(held.to, Some(RequisitionStatus::OnHold));

        let rejected = transition(RequisitionStatus::OnHold, RequisitionEvent::ManagerRejected)
            .expect("on hold -> manager rejected");
        assert_eq!(rejected.to, Some(RequisitionStatus::ManagerRejected));

        let error = transition(RequisitionStatus::OnHold, RequisitionEvent::ManagerHeld)
            .expect_err("hold cannot be applied twice");
        assert_eq!(
            error.to_string(),
            "requisition in status `On Hold` is not awaiting manager action"
        );
    }

    #[test]
    fn concurrent_update_names_both_statuses() {
        let error = TransitionError::ConcurrentUpdate {
            expected: RequisitionStatus::Pending,
            found: RequisitionStatus::OnHold,
            event: RequisitionEvent::ManagerApproved,
        };

        assert_eq!(
            error.to_string(),
            "requisition changed from `Pending` to `On Hold` while `manager_approved` was being applied; reload and retry"
        );
    }

    #[test]
    fn transitions_cannot_be_replayed() {
        let error = transition(RequisitionStatus::ManagerApproved, RequisitionEvent::ManagerApproved)
            .expect_err("approval cannot be applied twice");
        assert_eq!(
            error,
            TransitionError::InvalidTransition {
                from: RequisitionStatus::ManagerApproved,
                event: RequisitionEvent::ManagerApproved,
            }
        );

        assert!(transition(RequisitionStatus::HrApproved, RequisitionEvent::HrApproved).is_err());
        assert!(transition(RequisitionStatus::Pending, RequisitionEvent::HrApproved).is_err());
    }

    #[test]
    fn terminal_states_accept_nothing() {
        let every_event = [
            RequisitionEvent::ManagerApproved,
            RequisitionEvent::ManagerRejected,
            RequisitionEvent::ManagerHeld,
            RequisitionEvent::HrApproved,
            RequisitionEvent::HrRejected,
            RequisitionEvent::Allocated,
            RequisitionEvent::Withdrawn,
        ];

        for status in RequisitionStatus::ALL.into_iter().filter(RequisitionStatus::is_terminal) {
            for event in every_event {
                assert!(
                    transition(status, event).is_err(),
                    "{status:?} must not accept {event:?}"
                );
            }
        }
    }

    #[test]
    fn withdrawal_matches_the_cancelable_set() {
        for status in RequisitionStatus::ALL {
            let result = transition(status, RequisitionEvent::Withdrawn);
            assert_eq!(result.is_ok(), status.is_withdrawable(), "{status:?}");
            if let Ok(outcome) = result {
                assert_eq!(outcome.to, None);
            }
        }
    }

    #[test]
    fn transition_emits_audit_event() {
        let engine = WorkflowEngine::new();
        let sink = InMemoryAuditSink::default();
        let audit = AuditContext::new(
            Some(RequisitionId("REQ-1".to_owned())),
            "req-42",
            "u-mgr-1",
        );

        engine
            .apply_with_audit(
                RequisitionStatus::Pending,
                RequisitionEvent::ManagerHeld,
                &sink,
                &audit,
            )
            .expect("transition should succeed");
        let _ = engine.apply_with_audit(
            RequisitionStatus::HrRejected,
            RequisitionEvent::Withdrawn,
            &sink,
            &audit,
        );

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "requisition.transition_applied");
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("on_hold"));
        assert_eq!(events[1].event_type, "requisition.transition_rejected");
        assert_eq!(events[1].correlation_id, "req-42");
    }
}
