use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub use crate::claude::list_models::types::ModelType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub display_name: String,
    #[serde(rename = "type")]
    pub r#type: ModelType,
}
