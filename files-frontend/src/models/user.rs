use serde::{Deserialize, Serialize};

/// Directory profile of the signed-in user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub display_name: String,
    pub mail: Option<String>,
}
