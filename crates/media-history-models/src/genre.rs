use serde::{Deserialize, Serialize};

/// Entry of the API's static genre vocabulary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Genre {
    pub id: u32,
    pub name: String,
}
