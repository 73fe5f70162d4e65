//! Retrieval pipeline: pick the most recent matching messages, fetch and
//! decode them newest first, and always release the session.

use std::num::NonZeroUsize;

use tracing::{debug, info, warn};

use crate::error::{MailError, Result};
use crate::mailbox::{Connector, MailboxSession, SearchCriterion, SessionGuard};
use crate::model::message::{FailureStage, FetchFailure, MessageId, ParsedMessage, Retrieval};
use crate::parser::mime::MessageParser;

/// What to retrieve.
#[derive(Debug, Clone, Copy)]
pub struct RetrieveRequest {
    /// Upper bound on the number of messages processed.
    pub limit: NonZeroUsize,
    /// Only consider messages without the `\Seen` flag.
    pub unseen_only: bool,
    /// Flag each processed message as read. Fetching alone never sets
    /// `\Seen`, so without this the folder's flags are left untouched.
    pub mark_as_read: bool,
}

impl RetrieveRequest {
    /// Recent messages, read-only.
    pub fn recent(limit: NonZeroUsize) -> Self {
        Self {
            limit,
            unseen_only: false,
            mark_as_read: false,
        }
    }

    /// Unread messages, marking each one as read.
    pub fn unseen_and_mark(limit: NonZeroUsize) -> Self {
        Self {
            limit,
            unseen_only: true,
            mark_as_read: true,
        }
    }
}

/// The last `limit` identifiers of an ascending sequence, newest first.
pub fn select_newest(ids: &[MessageId], limit: NonZeroUsize) -> Vec<MessageId> {
    let start = ids.len().saturating_sub(limit.get());
    ids[start..].iter().rev().copied().collect()
}

/// Run one retrieval.
///
/// Login, connection, select and search failures abort the call. A message
/// whose fetch fails, or whose attachments cannot be written, is recorded in
/// [`Retrieval::failures`], left unflagged and skipped. A failed read-flag
/// update is only logged. The session is closed before this returns,
/// whatever the outcome.
///
/// `progress` receives `(processed, total)` after each selected message.
pub fn retrieve<C: Connector>(
    connector: &C,
    parser: &MessageParser<'_>,
    folder: &str,
    request: RetrieveRequest,
    progress: &dyn Fn(usize, usize),
) -> Result<Retrieval> {
    let mut session = SessionGuard::new(connector.open()?);
    session.select_folder(folder)?;

    let criterion = SearchCriterion::from_unseen_only(request.unseen_only);
    let ids = session.search(criterion)?;
    if ids.is_empty() {
        info!(folder, criterion = criterion.as_imap(), "No matching messages");
        return Ok(Retrieval::default());
    }

    let selected = select_newest(&ids, request.limit);
    info!(
        folder,
        matched = ids.len(),
        selected = selected.len(),
        "Retrieving messages"
    );

    let mut retrieval = Retrieval::default();
    let total = selected.len();
    for (done, id) in selected.into_iter().enumerate() {
        match process_one(&mut *session, parser, id, request.mark_as_read)? {
            Ok(message) => retrieval.messages.push(message),
            Err(failure) => retrieval.failures.push(failure),
        }
        progress(done + 1, total);
    }

    Ok(retrieval)
}

/// Fetch, parse and optionally flag one message.
///
/// The outer `Result` carries errors that abort the whole retrieval; the
/// inner one a fetch failure limited to this message.
fn process_one<S: MailboxSession>(
    session: &mut S,
    parser: &MessageParser<'_>,
    id: MessageId,
    mark_as_read: bool,
) -> Result<std::result::Result<ParsedMessage, FetchFailure>> {
    let raw = match session.fetch(id) {
        Ok(raw) => raw,
        Err(MailError::Fetch { id, reason }) => {
            warn!(%id, reason = %reason, "Fetch failed, skipping message");
            return Ok(Err(FetchFailure {
                id,
                stage: FailureStage::Fetch,
                reason,
            }));
        }
        Err(e) => return Err(e),
    };
    debug!(%id, bytes = raw.len(), "Fetched message");

    // Attachment files already written for this message stay on disk.
    let message = match parser.parse_message(&raw, id) {
        Ok(message) => message,
        Err(e @ MailError::Io { .. }) => {
            warn!(%id, error = %e, "Could not save attachment, skipping message");
            return Ok(Err(FetchFailure {
                id,
                stage: FailureStage::SaveAttachment,
                reason: e.to_string(),
            }));
        }
        Err(e) => return Err(e),
    };

    if mark_as_read {
        if let Err(e) = session.mark_seen(id) {
            warn!(%id, error = %e, "Could not mark message as read");
        }
    }

    Ok(Ok(message))
}
