use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user owning news feeds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Database row id
    pub id: i64,
    /// External, unique user identifier
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}
