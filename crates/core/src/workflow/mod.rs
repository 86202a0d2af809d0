pub mod authority;
pub mod engine;
pub mod states;

pub use authority::{AuthorityPolicy, AuthorizationDenial};
pub use engine::{transition, TransitionError, WorkflowEngine};
pub use states::{HrAction, ManagerAction, RequisitionEvent, Stage, TransitionOutcome};
