pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod notify;
pub mod workflow;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use domain::asset_type::AssetType;
pub use domain::requisition::{
    NewRequisition, RequestFor, RequestType, Requisition, RequisitionId, RequisitionStatus,
    StageDecision, ValidatedRequisition,
};
pub use domain::user::{Actor, Role, RoleSet, User, UserId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use notify::{Notification, NotificationKind, Notifier, NotifyError, Recipient};
pub use workflow::{
    AuthorityPolicy, AuthorizationDenial, HrAction, ManagerAction, RequisitionEvent, Stage,
    TransitionError, TransitionOutcome, WorkflowEngine,
};
