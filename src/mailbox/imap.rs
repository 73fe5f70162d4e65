//! IMAP-over-TLS implementation of [`MailboxSession`].

use std::net::TcpStream;

use native_tls::{TlsConnector, TlsStream};
use tracing::{debug, info, warn};

use crate::config::{Credentials, ImapConfig};
use crate::error::{MailError, Result};
use crate::model::message::MessageId;

use super::{Connector, MailboxSession, SearchCriterion};

type TlsSession = imap::Session<TlsStream<TcpStream>>;

/// Full message without the implicit `\Seen` a plain `RFC822` fetch sets.
/// Flagging happens only through [`MailboxSession::mark_seen`].
const FETCH_QUERY: &str = "BODY.PEEK[]";

/// Flag update issued by `mark_seen`.
const MARK_SEEN_QUERY: &str = "+FLAGS (\\Seen)";

/// Connects to an IMAP server over implicit TLS and logs in.
#[derive(Debug, Clone)]
pub struct ImapConnector {
    host: String,
    port: u16,
    credentials: Credentials,
}

impl ImapConnector {
    pub fn new(imap: &ImapConfig, credentials: Credentials) -> Self {
        Self {
            host: imap.host.clone(),
            port: imap.port,
            credentials,
        }
    }

    fn server(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Connector for ImapConnector {
    type Session = ImapSession;

    fn open(&self) -> Result<ImapSession> {
        let server = self.server();
        debug!(server = %server, "Connecting to IMAP server");

        let tls = TlsConnector::builder()
            .build()
            .map_err(|e| MailError::Connection {
                server: server.clone(),
                reason: e.to_string(),
            })?;

        let client = imap::connect((self.host.as_str(), self.port), &self.host, &tls).map_err(
            |e| MailError::Connection {
                server: server.clone(),
                reason: e.to_string(),
            },
        )?;

        let session = client
            .login(&self.credentials.username, &self.credentials.password)
            .map_err(|(e, _client)| match e {
                imap::Error::No(reason) | imap::Error::Bad(reason) => MailError::Authentication {
                    server: server.clone(),
                    reason,
                },
                other => MailError::Connection {
                    server: server.clone(),
                    reason: other.to_string(),
                },
            })?;

        info!(server = %server, user = %self.credentials.username, "Logged in");
        Ok(ImapSession {
            session: Some(session),
            server,
        })
    }
}

/// A logged-in IMAP session. `None` once logged out.
pub struct ImapSession {
    session: Option<TlsSession>,
    server: String,
}

impl ImapSession {
    fn live(&mut self) -> Result<&mut TlsSession> {
        let server = &self.server;
        self.session.as_mut().ok_or_else(|| MailError::Connection {
            server: server.clone(),
            reason: "session already closed".into(),
        })
    }

    fn connection_error(&self, e: &imap::Error) -> MailError {
        MailError::Connection {
            server: self.server.clone(),
            reason: e.to_string(),
        }
    }
}

/// Server-side rejections, as opposed to transport failures.
fn rejection(e: &imap::Error) -> Option<&str> {
    match e {
        imap::Error::No(reason) | imap::Error::Bad(reason) => Some(reason),
        _ => None,
    }
}

impl MailboxSession for ImapSession {
    fn select_folder(&mut self, name: &str) -> Result<()> {
        let result = self.live()?.select(name);
        match result {
            Ok(mailbox) => {
                debug!(folder = name, exists = mailbox.exists, "Selected folder");
                Ok(())
            }
            Err(e) => Err(match rejection(&e) {
                Some(reason) => MailError::Select {
                    folder: name.to_string(),
                    reason: reason.to_string(),
                },
                None => self.connection_error(&e),
            }),
        }
    }

    fn search(&mut self, criterion: SearchCriterion) -> Result<Vec<MessageId>> {
        let result = self.live()?.search(criterion.as_imap());
        match result {
            Ok(found) => {
                // The crate hands back an unordered set; sequence numbers
                // ascend with arrival order.
                let mut ids: Vec<MessageId> = found.into_iter().map(MessageId).collect();
                ids.sort_unstable();
                debug!(criterion = criterion.as_imap(), count = ids.len(), "Search done");
                Ok(ids)
            }
            Err(e) => Err(match rejection(&e) {
                Some(reason) => MailError::Search(reason.to_string()),
                None => self.connection_error(&e),
            }),
        }
    }

    fn fetch(&mut self, id: MessageId) -> Result<Vec<u8>> {
        let result = self.live()?.fetch(id.to_string(), FETCH_QUERY);
        match result {
            Ok(fetches) => fetches
                .iter()
                .find_map(|f| f.body())
                .map(<[u8]>::to_vec)
                .ok_or_else(|| MailError::Fetch {
                    id,
                    reason: "server returned no message body".into(),
                }),
            Err(e) => Err(match rejection(&e) {
                Some(reason) => MailError::Fetch {
                    id,
                    reason: reason.to_string(),
                },
                None => self.connection_error(&e),
            }),
        }
    }

    fn mark_seen(&mut self, id: MessageId) -> Result<()> {
        let result = self.live()?.store(id.to_string(), MARK_SEEN_QUERY);
        result.map(|_| ()).map_err(|e| MailError::MarkSeen {
            id,
            reason: e.to_string(),
        })
    }

    fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            match session.logout() {
                Ok(()) => debug!(server = %self.server, "Logged out"),
                Err(e) => warn!(server = %self.server, error = %e, "Logout failed"),
            }
        }
    }
}

impl Drop for ImapSession {
    fn drop(&mut self) {
        self.close();
    }
}
