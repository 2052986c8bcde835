use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Identity as handed to us at connect time. Issuance is out of scope;
/// the avatar blob is passed through untouched.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub display_name: String,
    #[ts(type = "unknown")]
    pub avatar: Option<serde_json::Value>,
}
