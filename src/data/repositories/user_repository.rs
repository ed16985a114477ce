use anyhow::{Context, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;

use crate::base::UserRepository;
use crate::models::User;
use crate::utils::{current_timestamp, format_db_timestamp, parse_db_timestamp};

pub struct SqliteUserRepository {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl SqliteUserRepository {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn map_row(row: &Row) -> Result<User> {
        Ok(User {
            id: row.get(0)?,
            user_id: row.get(1)?,
            created_at: parse_db_timestamp(&row.get::<_, String>(2)?)?,
            updated_at: row
                .get::<_, Option<String>>(3)?
                .map(|s| parse_db_timestamp(&s))
                .transpose()?,
        })
    }
}

impl UserRepository for SqliteUserRepository {
    fn create_user(&self, user_id: &str) -> Result<User> {
        let conn = self.pool.get()?;
        let created_at = current_timestamp();
        conn.execute(
            "INSERT INTO users (user_id, created_at) VALUES (?, ?)",
            params![user_id, format_db_timestamp(created_at)],
        )
        .with_context(|| format!("Failed to insert user '{}'", user_id))?;

        Ok(User {
            id: conn.last_insert_rowid(),
            user_id: user_id.to_string(),
            created_at,
            updated_at: None,
        })
    }

    fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, created_at, updated_at FROM users WHERE user_id = ?",
        )?;

        let row = stmt
            .query_row(params![user_id], |row| Ok(Self::map_row(row)))
            .optional()?;
        row.transpose()
    }

    fn get_all_users(&self) -> Result<Vec<User>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT id, user_id, created_at, updated_at FROM users ORDER BY id")?;
        let mut rows = stmt.query([])?;

        let mut users = Vec::new();
        while let Some(row) = rows.next()? {
            users.push(Self::map_row(row)?);
        }
        Ok(users)
    }
}
