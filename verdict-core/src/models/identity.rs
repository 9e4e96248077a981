use serde::{Deserialize, Serialize};

/// The caller a request acts on behalf of.
/// Every history operation is scoped to one of these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub display_name: String,
}
