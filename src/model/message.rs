//! Retrieved message types.

use std::fmt;
use std::path::PathBuf;

/// Server-assigned message identifier (IMAP sequence number).
///
/// Only meaningful while the session that produced it keeps its folder selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct MessageId(pub u32);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fetched and decoded message.
///
/// Built once by the message parser and never mutated afterwards.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ParsedMessage {
    /// Identifier the message was fetched with.
    pub id: MessageId,

    /// Decoded `From:` header.
    pub sender: String,

    /// Decoded `Subject:` header.
    pub subject: String,

    /// `Date:` header exactly as sent.
    pub date: String,

    /// Concatenated `text/plain` content. Never truncated here;
    /// see [`ParsedMessage::preview`].
    pub body_text: String,

    /// Saved attachment files, in the order their parts appear.
    pub attachments: Vec<PathBuf>,
}

impl ParsedMessage {
    /// The first `max_chars` characters of the body, with `...` appended
    /// when the body is longer.
    pub fn preview(&self, max_chars: usize) -> String {
        let mut chars = self.body_text.chars();
        let head: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{head}...")
        } else {
            head
        }
    }
}

/// Where processing of a skipped message stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// The server would not hand over the message.
    Fetch,
    /// An attachment could not be written to disk.
    SaveAttachment,
}

/// A message that was selected but skipped. It is never marked as read.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FetchFailure {
    pub id: MessageId,
    pub stage: FailureStage,
    pub reason: String,
}

/// Outcome of one retrieval call.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Retrieval {
    /// Successfully parsed messages, newest first.
    pub messages: Vec<ParsedMessage>,

    /// Selected messages that were skipped, in processing order.
    pub failures: Vec<FetchFailure>,
}

impl Retrieval {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.failures.is_empty()
    }
}
