//! Outbound mail: compose a multipart message and submit it over SMTP with
//! STARTTLS and login.

use std::path::{Path, PathBuf};

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials as SmtpCredentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::{info, warn};

use crate::config::{Credentials, SmtpConfig};
use crate::error::{MailError, Result};

/// A message to send.
#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Local files attached as `application/octet-stream`.
    pub attachments: Vec<PathBuf>,
}

/// Result of a successful submission.
#[derive(Debug, Clone, Default)]
pub struct SendReport {
    /// Attachment paths that did not exist and were left out.
    pub skipped_attachments: Vec<PathBuf>,
}

/// Build the MIME message: a `text/plain` body followed by one part per
/// readable attachment. Missing files are skipped and reported.
pub fn compose(from: &str, outgoing: &OutgoingMessage) -> Result<(Message, Vec<PathBuf>)> {
    let from: Mailbox = from
        .parse()
        .map_err(|e| MailError::Compose(format!("invalid sender '{from}': {e}")))?;
    let to: Mailbox = outgoing
        .to
        .trim()
        .parse()
        .map_err(|e| MailError::Compose(format!("invalid recipient '{}': {e}", outgoing.to)))?;
    let octet_stream = ContentType::parse("application/octet-stream")
        .map_err(|e| MailError::Compose(e.to_string()))?;

    let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(outgoing.body.clone()));
    let mut skipped = Vec::new();

    for path in &outgoing.attachments {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Attachment not found, skipping");
                skipped.push(path.clone());
                continue;
            }
            Err(e) => return Err(MailError::io(path, e)),
        };
        let name = attachment_name(path);
        parts = parts.singlepart(Attachment::new(name).body(bytes, octet_stream.clone()));
    }

    let message = Message::builder()
        .from(from)
        .to(to)
        .subject(outgoing.subject.clone())
        .multipart(parts)
        .map_err(|e| MailError::Compose(e.to_string()))?;

    Ok((message, skipped))
}

/// Compose and submit `outgoing` from the account in `credentials`.
pub fn send_message(
    smtp: &SmtpConfig,
    credentials: &Credentials,
    outgoing: &OutgoingMessage,
) -> Result<SendReport> {
    let (message, skipped_attachments) = compose(&credentials.username, outgoing)?;
    let server = format!("{}:{}", smtp.host, smtp.port);

    let mailer = SmtpTransport::starttls_relay(&smtp.host)
        .map_err(|e| MailError::Connection {
            server: server.clone(),
            reason: e.to_string(),
        })?
        .port(smtp.port)
        .credentials(SmtpCredentials::new(
            credentials.username.clone(),
            credentials.password.clone(),
        ))
        .build();

    mailer
        .send(&message)
        .map_err(|e| classify_smtp_error(&server, e))?;

    info!(to = %outgoing.to, server = %server, "Message sent");
    Ok(SendReport {
        skipped_attachments,
    })
}

fn classify_smtp_error(server: &str, e: lettre::transport::smtp::Error) -> MailError {
    // 530/534/535: authentication required, too weak or rejected
    let auth_rejected = e
        .status()
        .is_some_and(|code| matches!(code.to_string().as_str(), "530" | "534" | "535"));

    if auth_rejected {
        MailError::Authentication {
            server: server.to_string(),
            reason: e.to_string(),
        }
    } else if e.is_transient() || e.is_permanent() || e.is_response() || e.is_client() {
        MailError::Send(e.to_string())
    } else {
        MailError::Connection {
            server: server.to_string(),
            reason: e.to_string(),
        }
    }
}

fn attachment_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_plain_body() {
        let outgoing = OutgoingMessage {
            to: "bob@example.com".into(),
            subject: "Status".into(),
            body: "All good.".into(),
            attachments: Vec::new(),
        };
        let (message, skipped) = compose("alice@example.com", &outgoing).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: Status"));
        assert!(raw.contains("To: bob@example.com"));
        assert!(raw.contains("All good."));
        assert!(skipped.is_empty());
    }

    #[test]
    fn test_compose_skips_missing_attachment() {
        let tmp = tempfile::tempdir().unwrap();
        let present = tmp.path().join("notes.txt");
        std::fs::write(&present, b"notes").unwrap();
        let missing = tmp.path().join("missing.bin");

        let outgoing = OutgoingMessage {
            to: "bob@example.com".into(),
            subject: "Files".into(),
            body: "see attached".into(),
            attachments: vec![present, missing.clone()],
        };
        let (message, skipped) = compose("alice@example.com", &outgoing).unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).into_owned();
        assert!(raw.contains("notes.txt"));
        assert_eq!(skipped, vec![missing]);
    }

    #[test]
    fn test_compose_rejects_bad_recipient() {
        let outgoing = OutgoingMessage {
            to: "not an address".into(),
            ..Default::default()
        };
        let err = compose("alice@example.com", &outgoing).unwrap_err();
        assert!(matches!(err, MailError::Compose(_)));
    }
}
