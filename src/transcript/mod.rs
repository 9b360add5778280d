//! Transcript rendering
//!
//! Turns the conversation log into presentation descriptors. Derivation is a
//! pure function of the log; the only state a renderer keeps is the entry
//! count of its previous pass, so it knows when to scroll.

mod terminal;

use crate::conversation::{ConversationLog, EntryBody, EntryId, MessageEntry, Role, Status};

pub use terminal::TerminalTranscript;

/// Which lane of the transcript an entry renders in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Asker,
    Respondent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presentation {
    /// Animated three-dot indicator, no content
    Placeholder,
    Text(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryView {
    pub id: EntryId,
    pub side: Side,
    pub presentation: Presentation,
    pub attachment_url: Option<String>,
}

/// Respondent side unless the entry is an asked (non-pending) question.
pub fn orientation(entry: &MessageEntry) -> Side {
    if entry.role != Role::Question || entry.status() == Status::Pending {
        Side::Respondent
    } else {
        Side::Asker
    }
}

pub fn presentation(entry: &MessageEntry) -> Presentation {
    match &entry.body {
        EntryBody::Pending => Presentation::Placeholder,
        EntryBody::Resolved { text, .. } => Presentation::Text(text.clone()),
        EntryBody::Failed { reason } => Presentation::Failed(reason.clone()),
    }
}

pub fn derive(log: &ConversationLog) -> Vec<EntryView> {
    log.iter()
        .map(|(id, entry)| EntryView {
            id,
            side: orientation(entry),
            presentation: presentation(entry),
            attachment_url: entry.attachment_url().map(str::to_string),
        })
        .collect()
}

/// Host hook that brings an entry into view
pub trait ScrollTarget {
    fn scroll_into_view(&mut self, last: EntryId);
}

pub struct TranscriptRenderer<S> {
    target: S,
    rendered_len: usize,
}

impl<S: ScrollTarget> TranscriptRenderer<S> {
    pub fn new(target: S) -> Self {
        Self {
            target,
            rendered_len: 0,
        }
    }

    /// Re-derive the views, scrolling once if the entry count changed
    pub fn render(&mut self, log: &ConversationLog) -> Vec<EntryView> {
        let views = derive(log);

        if views.len() != self.rendered_len {
            self.rendered_len = views.len();
            if let Some(last) = views.last() {
                self.target.scroll_into_view(last.id);
            }
        }

        views
    }

    #[cfg(test)]
    pub fn target(&self) -> &S {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut S {
        &mut self.target
    }

    #[cfg(test)]
    pub fn into_target(self) -> S {
        self.target
    }
}
