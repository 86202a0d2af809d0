use reqflow_core::audit::{AuditEvent, AuditOutcome, AuditSink};
use tracing::{info, warn};

/// Writes audit events into the structured log stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let requisition_id =
            event.requisition_id.as_ref().map_or("unknown", |id| id.0.as_str()).to_owned();
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();

        match event.outcome {
            AuditOutcome::Success => info!(
                event_name = %event.event_type,
                correlation_id = %event.correlation_id,
                requisition_id = %requisition_id,
                audit_event_id = %event.event_id,
                category = event.category.as_str(),
                outcome = event.outcome.as_str(),
                actor = %event.actor,
                metadata = %metadata,
                "audit"
            ),
            AuditOutcome::Rejected | AuditOutcome::Failed => warn!(
                event_name = %event.event_type,
                correlation_id = %event.correlation_id,
                requisition_id = %requisition_id,
                audit_event_id = %event.event_id,
                category = event.category.as_str(),
                outcome = event.outcome.as_str(),
                actor = %event.actor,
                metadata = %metadata,
                "audit"
            ),
        }
    }
}
