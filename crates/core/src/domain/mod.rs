pub mod asset_type;
pub mod requisition;
pub mod user;
