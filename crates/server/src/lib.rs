//! HTTP surface of the requisition approval service.

pub mod api;
pub mod audit;
pub mod auth;
pub mod bootstrap;
pub mod health;
pub mod notifier;
pub mod service;

pub use api::{router, AppState};
pub use bootstrap::{bootstrap, bootstrap_with_config, Application, BootstrapError};
pub use service::{Repositories, RequisitionService, WithdrawalReceipt};
