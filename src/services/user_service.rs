use anyhow::Result;
use log::info;
use serde::Serialize;
use std::sync::Arc;

use crate::base::UserRepository;

/// Outcome of `add_user`
#[derive(Debug, Clone, Serialize)]
pub struct AddUserResult {
    pub user_id: String,

    /// Confirmation shown on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    pub error_message: Option<String>,
}

/// User registration
pub struct UserService {
    users: Arc<dyn UserRepository>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    /// Adds a user; an existing id is reported through `error_message`
    pub async fn add_user(&self, user_id: &str) -> Result<AddUserResult> {
        if self.users.get_user(user_id)?.is_some() {
            return Ok(AddUserResult {
                user_id: user_id.to_string(),
                message: None,
                error_message: Some(format!("User with ID '{}' already exists", user_id)),
            });
        }

        match self.users.create_user(user_id) {
            Ok(user) => {
                info!("Created user {} (row {})", user.user_id, user.id);
                Ok(AddUserResult {
                    user_id: user_id.to_string(),
                    message: Some(format!("User '{}' created successfully", user_id)),
                    error_message: None,
                })
            }
            Err(e) => Ok(AddUserResult {
                user_id: user_id.to_string(),
                message: None,
                error_message: Some(format!("Failed to create user: {}", e)),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Database;

    #[tokio::test]
    async fn test_add_user_then_duplicate() {
        let service = UserService::new(Database::in_memory().unwrap().user_repository());

        let created = service.add_user("alice").await.unwrap();
        assert_eq!(created.message.as_deref(), Some("User 'alice' created successfully"));
        assert!(created.error_message.is_none());

        let duplicate = service.add_user("alice").await.unwrap();
        assert_eq!(duplicate.error_message.as_deref(), Some("User with ID 'alice' already exists"));
        let json = serde_json::to_value(&duplicate).unwrap();
        assert!(json.get("message").is_none());
    }
}
