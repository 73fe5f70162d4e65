//! Mailbox access: the session contract used by the retrieval pipeline and
//! the guard that guarantees a session is released.

pub mod imap;

use std::ops::{Deref, DerefMut};

use crate::error::Result;
use crate::model::message::MessageId;

/// Which messages of the selected folder a search returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchCriterion {
    All,
    Unseen,
}

impl SearchCriterion {
    pub fn from_unseen_only(unseen_only: bool) -> Self {
        if unseen_only {
            Self::Unseen
        } else {
            Self::All
        }
    }

    /// IMAP `SEARCH` key.
    pub fn as_imap(self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Unseen => "UNSEEN",
        }
    }
}

/// An authenticated connection bound to one server.
///
/// Calls are blocking round trips and must not overlap.
pub trait MailboxSession {
    /// Select the folder later calls operate on.
    fn select_folder(&mut self, name: &str) -> Result<()>;

    /// Identifiers matching `criterion`, in ascending arrival order.
    fn search(&mut self, criterion: SearchCriterion) -> Result<Vec<MessageId>>;

    /// Complete raw message bytes.
    fn fetch(&mut self, id: MessageId) -> Result<Vec<u8>>;

    /// Add the `\Seen` flag.
    fn mark_seen(&mut self, id: MessageId) -> Result<()>;

    /// Log out. Must be safe to call repeatedly and after earlier errors.
    fn close(&mut self);
}

/// Opens authenticated sessions.
pub trait Connector {
    type Session: MailboxSession;

    fn open(&self) -> Result<Self::Session>;
}

/// Owns a session and closes it when dropped, on every exit path.
pub struct SessionGuard<S: MailboxSession> {
    session: S,
}

impl<S: MailboxSession> SessionGuard<S> {
    pub fn new(session: S) -> Self {
        Self { session }
    }
}

impl<S: MailboxSession> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: MailboxSession> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: MailboxSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        self.session.close();
    }
}
