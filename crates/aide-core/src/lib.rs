use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum MemoryError {
    #[error("role must be one of: user, assistant, system (got '{0}')")]
    InvalidRole(String),
    #[error("kind must be one of: chat, remembered (got '{0}')")]
    InvalidKind(String),
    #[error("content cannot be empty")]
    EmptyContent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Chat,
    Remembered,
}

impl Kind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Remembered => "remembered",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "chat" => Some(Self::Chat),
            "remembered" => Some(Self::Remembered),
            _ => None,
        }
    }
}

impl Display for Kind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalize and validate a raw role token.
///
/// # Errors
/// Returns [`MemoryError::InvalidRole`] when the trimmed, lowercased token is
/// not one of `user`, `assistant`, `system`.
pub fn parse_role(raw: &str) -> Result<Role, MemoryError> {
    let normalized = raw.trim().to_ascii_lowercase();
    Role::parse(&normalized).ok_or_else(|| MemoryError::InvalidRole(raw.to_string()))
}

/// Normalize and validate a raw kind token. An empty token means `chat`.
///
/// # Errors
/// Returns [`MemoryError::InvalidKind`] when the trimmed, lowercased token is
/// not one of `chat`, `remembered`.
pub fn parse_kind(raw: &str) -> Result<Kind, MemoryError> {
    let normalized = raw.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return Ok(Kind::Chat);
    }
    Kind::parse(&normalized).ok_or_else(|| MemoryError::InvalidKind(raw.to_string()))
}

/// Trim and validate message content.
///
/// # Errors
/// Returns [`MemoryError::EmptyContent`] when nothing remains after trimming.
pub fn validate_content(raw: &str) -> Result<&str, MemoryError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(MemoryError::EmptyContent);
    }
    Ok(trimmed)
}

/// One stored conversational unit. `id` is assigned by the store on insert
/// and is strictly increasing; `deleted` is the only field that ever changes
/// after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryRecord {
    pub id: i64,
    pub user_id: String,
    pub role: Role,
    pub content: String,
    pub kind: Kind,
    pub deleted: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Merge the two recency streams (chat turns and remembered items) into one
/// bounded, chronologically ascending block of prompt text.
///
/// Both inputs are expected to hold at most `inject_count` records each
/// (newest first or in any order; only `id` matters). The merged set is
/// sorted ascending by `id` and truncated to the final `inject_count`
/// records by keeping the tail, so the block is weighted toward whichever
/// stream is newer. Each record renders as one line; the result never
/// exceeds `inject_count` lines and is empty when there is nothing to say.
#[must_use]
pub fn build_memory_block(
    chat: &[MemoryRecord],
    remembered: &[MemoryRecord],
    inject_count: usize,
) -> String {
    if inject_count == 0 {
        return String::new();
    }

    let mut rows: Vec<&MemoryRecord> = chat.iter().chain(remembered.iter()).collect();
    if rows.is_empty() {
        return String::new();
    }

    rows.sort_by_key(|record| record.id);
    let start = rows.len().saturating_sub(inject_count);

    rows[start..].iter().map(|record| render_memory_line(record)).collect::<Vec<_>>().join("\n")
}

/// Render one record as a compact memory line, tagged with role and kind.
#[must_use]
pub fn render_memory_line(record: &MemoryRecord) -> String {
    format!(
        "- {} ({}): {}",
        record.role.as_str().to_ascii_uppercase(),
        record.kind.as_str(),
        record.content
    )
}
