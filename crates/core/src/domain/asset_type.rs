use serde::{Deserialize, Serialize};

/// Catalog entry a requisition targets (laptop, monitor, phone, ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetType {
    pub id: String,
    pub name: String,
    pub active: bool,
}
