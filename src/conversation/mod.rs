//! Conversation types and state management
//!
//! The log is append-only. A question is always appended together with a
//! pending answer placeholder, and the placeholder is later resolved in place
//! through the [`EntryId`] handed out when it was created.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::providers::Answer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Question,
    Answer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Resolved,
    Failed,
}

/// Handle to one slot of a [`ConversationLog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(usize);

impl EntryId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum EntryBody {
    Pending,
    Resolved {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attachment_url: Option<String>,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEntry {
    pub role: Role,
    pub body: EntryBody,
    pub created_at: DateTime<Utc>,
}

impl MessageEntry {
    pub fn question(text: impl Into<String>) -> Self {
        Self {
            role: Role::Question,
            body: EntryBody::Resolved {
                text: text.into(),
                attachment_url: None,
            },
            created_at: Utc::now(),
        }
    }

    pub fn placeholder() -> Self {
        Self {
            role: Role::Answer,
            body: EntryBody::Pending,
            created_at: Utc::now(),
        }
    }

    pub fn status(&self) -> Status {
        match self.body {
            EntryBody::Pending => Status::Pending,
            EntryBody::Resolved { .. } => Status::Resolved,
            EntryBody::Failed { .. } => Status::Failed,
        }
    }

    /// Message text; `None` while the entry is still processing.
    #[cfg(test)]
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            EntryBody::Resolved { text, .. } => Some(text),
            EntryBody::Pending | EntryBody::Failed { .. } => None,
        }
    }

    pub fn attachment_url(&self) -> Option<&str> {
        match &self.body {
            EntryBody::Resolved { attachment_url, .. } => attachment_url.as_deref(),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.body, EntryBody::Pending)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConversationError {
    #[error("No entry {0} in the conversation")]
    UnknownEntry(EntryId),

    #[error("Entry {0} is not awaiting an answer")]
    NotPending(EntryId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationLog {
    pub id: Uuid,
    entries: Vec<MessageEntry>,
    /// Number of updates published to readers
    #[serde(default)]
    revision: u64,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            entries: Vec::new(),
            revision: 0,
        }
    }

    /// Append the question and its pending answer, returning the answer slot.
    pub fn begin_exchange(&mut self, prompt: &str) -> EntryId {
        self.entries.push(MessageEntry::question(prompt));
        self.entries.push(MessageEntry::placeholder());
        EntryId(self.entries.len() - 1)
    }

    pub fn resolve(&mut self, id: EntryId, answer: Answer) -> Result<(), ConversationError> {
        let entry = self.pending_mut(id)?;
        entry.body = EntryBody::Resolved {
            text: answer.text,
            attachment_url: answer.url,
        };
        Ok(())
    }

    pub fn fail(&mut self, id: EntryId, reason: impl Into<String>) -> Result<(), ConversationError> {
        let entry = self.pending_mut(id)?;
        entry.body = EntryBody::Failed {
            reason: reason.into(),
        };
        Ok(())
    }

    fn pending_mut(&mut self, id: EntryId) -> Result<&mut MessageEntry, ConversationError> {
        let entry = self
            .entries
            .get_mut(id.0)
            .ok_or(ConversationError::UnknownEntry(id))?;

        if !entry.is_pending() {
            return Err(ConversationError::NotPending(id));
        }

        Ok(entry)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn bump_revision(&mut self) {
        self.revision += 1;
    }

    #[cfg(test)]
    pub fn get(&self, id: EntryId) -> Option<&MessageEntry> {
        self.entries.get(id.0)
    }

    #[cfg(test)]
    pub fn entries(&self) -> &[MessageEntry] {
        &self.entries
    }

    /// Entries paired with the handle of their slot.
    pub fn iter(&self) -> impl Iterator<Item = (EntryId, &MessageEntry)> {
        self.entries.iter().enumerate().map(|(i, e)| (EntryId(i), e))
    }

    pub fn has_pending(&self) -> bool {
        self.entries.iter().any(MessageEntry::is_pending)
    }

    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_pending()).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ConversationLog {
    fn default() -> Self {
        Self::new()
    }
}
