/// Chat persistence operations
///
/// A chat is the durable record of one run: its title, status, the messages
/// exchanged with the user and, while the run waits for an answer, the
/// serialized run state needed to resume it.
/// All queries use parameterized queries for SQL injection prevention.
use anyhow::{Context, Result};
use sdk::types::RunState;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum number of characters kept in a chat title
pub const TITLE_MAX_CHARS: usize = 50;

/// Chat status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatStatus {
    Running,
    AwaitingUser,
    Completed,
    Failed,
}

impl ChatStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ChatStatus::Running => "running",
            ChatStatus::AwaitingUser => "awaiting_user",
            ChatStatus::Completed => "completed",
            ChatStatus::Failed => "failed",
        }
    }

    fn parse(value: &str) -> Self {
        match value {
            "running" => ChatStatus::Running,
            "awaiting_user" => ChatStatus::AwaitingUser,
            "completed" => ChatStatus::Completed,
            _ => ChatStatus::Failed,
        }
    }
}

/// Message author
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    System,
}

impl Author {
    pub fn as_str(&self) -> &str {
        match self {
            Author::User => "user",
            Author::System => "system",
        }
    }
}

/// Chat record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub title: String,
    pub status: ChatStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Chat message record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub chat_id: String,
    pub author: Author,
    pub content: String,
    pub agent_steps: Option<serde_json::Value>,
    pub created_at: i64,
}

/// Title of a chat: the first characters of the request
pub fn chat_title(request: &str) -> String {
    request.trim().chars().take(TITLE_MAX_CHARS).collect()
}

fn now() -> Result<i64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64)
}

fn chat_from_row(row: &SqliteRow) -> Chat {
    Chat {
        id: row.get("id"),
        title: row.get("title"),
        status: ChatStatus::parse(row.get::<String, _>("status").as_str()),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Chat repository for database operations
pub struct ChatRepository {
    pool: SqlitePool,
}

impl ChatRepository {
    /// Create a new chat repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a chat for a run, titled after the request
    pub async fn create_chat(&self, id: &str, request: &str) -> Result<Chat> {
        let now = now()?;
        let title = chat_title(request);
        let status = ChatStatus::Running;

        sqlx::query(
            "INSERT INTO chats (id, title, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(&title)
        .bind(status.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create chat")?;

        Ok(Chat {
            id: id.to_string(),
            title,
            status,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a chat by ID
    pub async fn get_chat(&self, id: &str) -> Result<Option<Chat>> {
        let row = sqlx::query(
            "SELECT id, title, status, created_at, updated_at FROM chats WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch chat")?;

        Ok(row.as_ref().map(chat_from_row))
    }

    /// List the most recent chats, newest first
    pub async fn list_chats(&self, limit: i64) -> Result<Vec<Chat>> {
        let rows = sqlx::query(
            "SELECT id, title, status, created_at, updated_at FROM chats
             ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list chats")?;

        Ok(rows.iter().map(chat_from_row).collect())
    }

    /// Update the status of a chat
    pub async fn set_status(&self, id: &str, status: ChatStatus) -> Result<()> {
        sqlx::query("UPDATE chats SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(now()?)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update chat status")?;

        Ok(())
    }

    /// Append a message to a chat
    pub async fn add_message(
        &self,
        chat_id: &str,
        author: Author,
        content: &str,
        agent_steps: Option<&serde_json::Value>,
    ) -> Result<i64> {
        let agent_steps = agent_steps
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to serialize agent steps")?;

        let result = sqlx::query(
            "INSERT INTO messages (chat_id, author, content, agent_steps, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(chat_id)
        .bind(author.as_str())
        .bind(content)
        .bind(agent_steps)
        .bind(now()?)
        .execute(&self.pool)
        .await
        .context("Failed to add message")?;

        Ok(result.last_insert_rowid())
    }

    /// Get all messages of a chat, oldest first
    pub async fn get_messages(&self, chat_id: &str) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            "SELECT id, chat_id, author, content, agent_steps, created_at FROM messages
             WHERE chat_id = ? ORDER BY id ASC",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch messages")?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let agent_steps = row
                .get::<Option<String>, _>("agent_steps")
                .map(|raw| serde_json::from_str(&raw))
                .transpose()
                .context("Stored agent steps are not valid JSON")?;

            messages.push(ChatMessage {
                id: row.get("id"),
                chat_id: row.get("chat_id"),
                author: match row.get::<String, _>("author").as_str() {
                    "user" => Author::User,
                    _ => Author::System,
                },
                content: row.get("content"),
                agent_steps,
                created_at: row.get("created_at"),
            });
        }

        Ok(messages)
    }

    /// Persist the state of a run suspended for the user
    pub async fn save_pending_state(&self, chat_id: &str, state: &RunState) -> Result<()> {
        let json = serde_json::to_string(state).context("Failed to serialize run state")?;

        let result = sqlx::query("UPDATE chats SET pending_state = ?, updated_at = ? WHERE id = ?")
            .bind(json)
            .bind(now()?)
            .bind(chat_id)
            .execute(&self.pool)
            .await
            .context("Failed to save pending state")?;

        if result.rows_affected() == 0 {
            anyhow::bail!("Chat {} does not exist", chat_id);
        }

        Ok(())
    }

    /// Load the saved state of a suspended run, if any
    pub async fn load_pending_state(&self, chat_id: &str) -> Result<Option<RunState>> {
        let raw: Option<Option<String>> =
            sqlx::query_scalar("SELECT pending_state FROM chats WHERE id = ?")
                .bind(chat_id)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to load pending state")?;

        raw.flatten()
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .context("Saved run state is not valid")
    }

    /// Forget the saved state of a run
    pub async fn clear_pending_state(&self, chat_id: &str) -> Result<()> {
        sqlx::query("UPDATE chats SET pending_state = NULL, updated_at = ? WHERE id = ?")
            .bind(now()?)
            .bind(chat_id)
            .execute(&self.pool)
            .await
            .context("Failed to clear pending state")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_is_truncated_by_characters() {
        let request = "é".repeat(80);
        assert_eq!(chat_title(&request).chars().count(), TITLE_MAX_CHARS);
        assert_eq!(chat_title("  short  "), "short");
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            ChatStatus::Running,
            ChatStatus::AwaitingUser,
            ChatStatus::Completed,
            ChatStatus::Failed,
        ] {
            assert_eq!(ChatStatus::parse(status.as_str()), status);
        }
    }
}
