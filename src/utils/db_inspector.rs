use anyhow::{Context, Result};
use log::info;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;

/// Tables and columns the application expects once every migration is applied
pub const EXPECTED_SCHEMA: &[(&str, &[&str])] = &[
    ("users", &["id", "user_id", "created_at", "updated_at"]),
    ("news_feeds", &["id", "user_id", "query_prompt", "created_at", "updated_at"]),
    (
        "news_articles",
        &[
            "id",
            "title",
            "url",
            "published_at",
            "source",
            "raw_html_path",
            "content_markdown_path",
            "thumbnail_url",
            "summary",
            "summary_short",
            "keywords",
            "author",
            "created_at",
        ],
    ),
    (
        "news_feed_items",
        &["id", "news_feed_id", "news_article_id", "curation_scores", "created_at"],
    ),
    (
        "workflow_run_history",
        &["id", "workflow_name", "input_data", "output_data", "status", "started_at", "completed_at"],
    ),
];

/// Read-only inspector used to compare a database file against the expected schema
pub struct DbInspector {
    connection: Connection,
}

impl DbInspector {
    /// Opens the database file read-only
    pub fn new(db_path: &Path) -> Result<Self> {
        if !db_path.exists() {
            return Err(anyhow::anyhow!("Database file does not exist: {}", db_path.display()));
        }

        let connection = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .context("Failed to open database connection")?;

        Ok(Self { connection })
    }

    pub fn get_tables(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .connection
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .context("Failed to prepare statement to list tables")?;

        let table_names = stmt
            .query_map([], |row| row.get(0))
            .context("Failed to query tables")?
            .collect::<std::result::Result<Vec<String>, _>>()
            .context("Failed to collect table names")?;

        Ok(table_names)
    }

    pub fn table_exists(&self, table_name: &str) -> Result<bool> {
        let count: i64 = self
            .connection
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
                [table_name],
                |row| row.get(0),
            )
            .context("Failed to check if table exists")?;

        Ok(count > 0)
    }

    /// Column names of a table, in declaration order
    pub fn get_columns(&self, table_name: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .connection
            .prepare("SELECT name FROM pragma_table_info(?) ORDER BY cid")
            .context("Failed to prepare statement to get table columns")?;

        let columns = stmt
            .query_map([table_name], |row| row.get(0))
            .context("Failed to query table columns")?
            .collect::<std::result::Result<Vec<String>, _>>()
            .context("Failed to collect table columns")?;

        Ok(columns)
    }

    pub fn get_row_count(&self, table_name: &str) -> Result<i64> {
        if !self.table_exists(table_name)? {
            return Err(anyhow::anyhow!("Table does not exist: {}", table_name));
        }

        let count: i64 = self
            .connection
            .query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table_name), [], |row| row.get(0))
            .context("Failed to get row count")?;

        Ok(count)
    }

    /// Lists every difference between the database and the expected schema
    pub fn check_schema(&self) -> Result<Vec<String>> {
        let mut issues = Vec::new();

        for (table, columns) in EXPECTED_SCHEMA {
            if !self.table_exists(table)? {
                issues.push(format!("Table '{}' does not exist", table));
                continue;
            }

            let existing = self.get_columns(table)?;
            for column in columns.iter() {
                if !existing.iter().any(|c| c == column) {
                    issues.push(format!("Column '{}' does not exist in table '{}'", column, table));
                }
            }
        }

        Ok(issues)
    }

    pub fn print_database_report(&self) -> Result<()> {
        info!("Database Structure Report");

        let tables = self.get_tables()?;
        info!("Found {} tables", tables.len());

        for table_name in &tables {
            let row_count = self.get_row_count(table_name)?;
            let columns = self.get_columns(table_name)?;
            info!("Table: {} ({} rows): {}", table_name, row_count, columns.join(", "));
        }

        Ok(())
    }
}
