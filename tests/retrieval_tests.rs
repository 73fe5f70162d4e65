//! Integration tests for the retrieval pipeline against an in-memory mailbox.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::rc::Rc;

use mailtide::error::{MailError, Result};
use mailtide::export::attachment::AttachmentWriter;
use mailtide::mailbox::{Connector, MailboxSession, SearchCriterion};
use mailtide::model::message::{FailureStage, MessageId};
use mailtide::parser::mime::MessageParser;
use mailtide::retrieve::{retrieve, RetrieveRequest};

/// What the fake server holds and what it was asked to do.
#[derive(Default)]
struct Mailbox {
    all: Vec<u32>,
    unseen: Vec<u32>,
    failing_fetches: HashSet<u32>,
    fail_mark_seen: bool,
    fail_search: bool,
    fail_select: bool,
    fail_login: bool,
    with_attachment: bool,
    attachment_names: HashMap<u32, String>,

    searches: RefCell<Vec<SearchCriterion>>,
    fetched: RefCell<Vec<u32>>,
    marked: RefCell<Vec<u32>>,
    opens: Cell<u32>,
    closes: Cell<u32>,
}

impl Mailbox {
    fn with_ids(all: impl IntoIterator<Item = u32>) -> Self {
        Self {
            all: all.into_iter().collect(),
            ..Default::default()
        }
    }

    fn raw_message(&self, id: u32) -> Vec<u8> {
        let name = self
            .attachment_names
            .get(&id)
            .map(String::as_str)
            .unwrap_or("data.bin");
        if self.with_attachment || self.attachment_names.contains_key(&id) {
            format!(
                "From: sender{id}@example.com\r\n\
Subject: Message {id}\r\n\
Content-Type: multipart/mixed; boundary=\"b\"\r\n\
\r\n\
--b\r\n\
Content-Type: text/plain\r\n\
\r\n\
body {id}\r\n\
--b\r\n\
Content-Type: application/octet-stream; name=\"{name}\"\r\n\
Content-Disposition: attachment; filename=\"{name}\"\r\n\
\r\n\
payload {id}\r\n\
--b--\r\n"
            )
            .into_bytes()
        } else {
            format!(
                "From: sender{id}@example.com\r\nSubject: Message {id}\r\n\
Date: Mon, 01 Jan 2024 00:00:00 +0000\r\n\r\nbody {id}\r\n"
            )
            .into_bytes()
        }
    }
}

struct FakeConnector {
    mailbox: Rc<Mailbox>,
}

struct FakeSession {
    mailbox: Rc<Mailbox>,
}

impl Connector for FakeConnector {
    type Session = FakeSession;

    fn open(&self) -> Result<FakeSession> {
        if self.mailbox.fail_login {
            return Err(MailError::Authentication {
                server: "imap.test:993".into(),
                reason: "invalid credentials".into(),
            });
        }
        self.mailbox.opens.set(self.mailbox.opens.get() + 1);
        Ok(FakeSession {
            mailbox: Rc::clone(&self.mailbox),
        })
    }
}

impl MailboxSession for FakeSession {
    fn select_folder(&mut self, name: &str) -> Result<()> {
        if self.mailbox.fail_select {
            return Err(MailError::Select {
                folder: name.to_string(),
                reason: "no such mailbox".into(),
            });
        }
        Ok(())
    }

    fn search(&mut self, criterion: SearchCriterion) -> Result<Vec<MessageId>> {
        self.mailbox.searches.borrow_mut().push(criterion);
        if self.mailbox.fail_search {
            return Err(MailError::Search("BAD command".into()));
        }
        let ids = match criterion {
            SearchCriterion::All => &self.mailbox.all,
            SearchCriterion::Unseen => &self.mailbox.unseen,
        };
        Ok(ids.iter().copied().map(MessageId).collect())
    }

    fn fetch(&mut self, id: MessageId) -> Result<Vec<u8>> {
        self.mailbox.fetched.borrow_mut().push(id.0);
        if self.mailbox.failing_fetches.contains(&id.0) {
            return Err(MailError::Fetch {
                id,
                reason: "NO message expunged".into(),
            });
        }
        Ok(self.mailbox.raw_message(id.0))
    }

    fn mark_seen(&mut self, id: MessageId) -> Result<()> {
        if self.mailbox.fail_mark_seen {
            return Err(MailError::MarkSeen {
                id,
                reason: "read-only".into(),
            });
        }
        self.mailbox.marked.borrow_mut().push(id.0);
        Ok(())
    }

    fn close(&mut self) {
        self.mailbox.closes.set(self.mailbox.closes.get() + 1);
    }
}

fn limit(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

fn run(mailbox: &Rc<Mailbox>, request: RetrieveRequest) -> Result<mailtide::model::message::Retrieval> {
    let temp = tempfile::tempdir().unwrap();
    let writer = AttachmentWriter::new(temp.path().join("attachments"));
    let parser = MessageParser::new(&writer);
    let connector = FakeConnector {
        mailbox: Rc::clone(mailbox),
    };
    retrieve(&connector, &parser, "INBOX", request, &|_, _| {})
}

// ─── Selection ──────────────────────────────────────────────────────

#[test]
fn test_newest_first_up_to_limit() {
    let mailbox = Rc::new(Mailbox::with_ids(1..=15));
    let retrieval = run(&mailbox, RetrieveRequest::recent(limit(10))).unwrap();

    let ids: Vec<u32> = retrieval.messages.iter().map(|m| m.id.0).collect();
    assert_eq!(ids, (6..=15).rev().collect::<Vec<_>>());
    assert_eq!(retrieval.messages[0].subject, "Message 15");
    assert!(retrieval.failures.is_empty());
    assert_eq!(*mailbox.searches.borrow(), vec![SearchCriterion::All]);
    assert!(mailbox.marked.borrow().is_empty());
    assert_eq!(mailbox.closes.get(), 1);
}

#[test]
fn test_unseen_marks_exactly_the_processed_messages() {
    let mut mailbox = Mailbox::with_ids(1..=20);
    mailbox.unseen = (1..=15).collect();
    let mailbox = Rc::new(mailbox);

    let retrieval = run(&mailbox, RetrieveRequest::unseen_and_mark(limit(10))).unwrap();

    let expected: Vec<u32> = (6..=15).rev().collect();
    let ids: Vec<u32> = retrieval.messages.iter().map(|m| m.id.0).collect();
    assert_eq!(ids, expected);
    assert_eq!(*mailbox.searches.borrow(), vec![SearchCriterion::Unseen]);
    assert_eq!(*mailbox.marked.borrow(), expected);
    assert_eq!(mailbox.closes.get(), 1);
}

#[test]
fn test_no_unseen_messages_fetches_nothing() {
    let mailbox = Rc::new(Mailbox::with_ids(1..=5));
    let retrieval = run(&mailbox, RetrieveRequest::unseen_and_mark(limit(10))).unwrap();

    assert!(retrieval.is_empty());
    assert!(mailbox.fetched.borrow().is_empty());
    assert!(mailbox.marked.borrow().is_empty());
    assert_eq!(mailbox.closes.get(), 1);
}

#[test]
fn test_fewer_messages_than_limit() {
    let mailbox = Rc::new(Mailbox::with_ids(1..=3));
    let retrieval = run(&mailbox, RetrieveRequest::recent(limit(10))).unwrap();
    let ids: Vec<u32> = retrieval.messages.iter().map(|m| m.id.0).collect();
    assert_eq!(ids, vec![3, 2, 1]);
}

// ─── Per-message failures ───────────────────────────────────────────

#[test]
fn test_failed_fetch_is_skipped_and_reported() {
    let mut mailbox = Mailbox::with_ids(1..=5);
    // Third in processing order (5, 4, 3, ...)
    mailbox.failing_fetches.insert(3);
    let mailbox = Rc::new(mailbox);

    let retrieval = run(&mailbox, RetrieveRequest::recent(limit(5))).unwrap();

    let ids: Vec<u32> = retrieval.messages.iter().map(|m| m.id.0).collect();
    assert_eq!(ids, vec![5, 4, 2, 1]);
    assert_eq!(retrieval.failures.len(), 1);
    assert_eq!(retrieval.failures[0].id, MessageId(3));
    assert_eq!(retrieval.failures[0].stage, FailureStage::Fetch);
    assert_eq!(*mailbox.fetched.borrow(), vec![5, 4, 3, 2, 1]);
    assert_eq!(mailbox.closes.get(), 1);
}

#[test]
fn test_failed_fetch_is_not_marked_seen() {
    let mut mailbox = Mailbox::with_ids(1..=3);
    mailbox.unseen = vec![1, 2, 3];
    mailbox.failing_fetches.insert(2);
    let mailbox = Rc::new(mailbox);

    run(&mailbox, RetrieveRequest::unseen_and_mark(limit(10))).unwrap();
    assert_eq!(*mailbox.marked.borrow(), vec![3, 1]);
}

#[test]
fn test_mark_seen_failure_keeps_message() {
    let mut mailbox = Mailbox::with_ids(1..=2);
    mailbox.unseen = vec![1, 2];
    mailbox.fail_mark_seen = true;
    let mailbox = Rc::new(mailbox);

    let retrieval = run(&mailbox, RetrieveRequest::unseen_and_mark(limit(10))).unwrap();
    assert_eq!(retrieval.messages.len(), 2);
    assert!(retrieval.failures.is_empty());
}

// ─── Aborts always release the session ──────────────────────────────

#[test]
fn test_login_failure_aborts_without_session() {
    let mailbox = Rc::new(Mailbox {
        fail_login: true,
        ..Mailbox::with_ids(1..=3)
    });
    let err = run(&mailbox, RetrieveRequest::recent(limit(10))).unwrap_err();

    assert!(matches!(err, MailError::Authentication { .. }));
    assert_eq!(mailbox.opens.get(), 0);
    assert_eq!(mailbox.closes.get(), 0);
}

#[test]
fn test_select_failure_aborts_and_closes() {
    let mailbox = Rc::new(Mailbox {
        fail_select: true,
        ..Mailbox::with_ids(1..=3)
    });
    let err = run(&mailbox, RetrieveRequest::recent(limit(10))).unwrap_err();

    assert!(matches!(err, MailError::Select { .. }));
    assert!(mailbox.searches.borrow().is_empty());
    assert_eq!(mailbox.closes.get(), 1);
}

#[test]
fn test_search_failure_aborts_and_closes() {
    let mailbox = Rc::new(Mailbox {
        fail_search: true,
        ..Mailbox::with_ids(1..=3)
    });
    let err = run(&mailbox, RetrieveRequest::recent(limit(10))).unwrap_err();

    assert!(matches!(err, MailError::Search(_)));
    assert!(mailbox.fetched.borrow().is_empty());
    assert_eq!(mailbox.closes.get(), 1);
}

#[test]
fn test_unwritable_attachment_dir_skips_each_message() {
    let mut mailbox = Mailbox {
        with_attachment: true,
        ..Mailbox::with_ids(1..=3)
    };
    mailbox.unseen = vec![1, 2, 3];
    let mailbox = Rc::new(mailbox);

    // A regular file where the attachment directory should be
    let temp = tempfile::tempdir().unwrap();
    let blocker = temp.path().join("attachments");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let writer = AttachmentWriter::new(&blocker);
    let parser = MessageParser::new(&writer);
    let connector = FakeConnector {
        mailbox: Rc::clone(&mailbox),
    };
    let retrieval = retrieve(
        &connector,
        &parser,
        "INBOX",
        RetrieveRequest::unseen_and_mark(limit(10)),
        &|_, _| {},
    )
    .unwrap();

    assert!(retrieval.messages.is_empty());
    let failed: Vec<u32> = retrieval.failures.iter().map(|f| f.id.0).collect();
    assert_eq!(failed, vec![3, 2, 1]);
    assert!(retrieval
        .failures
        .iter()
        .all(|f| f.stage == FailureStage::SaveAttachment));
    assert!(mailbox.marked.borrow().is_empty());
    assert_eq!(mailbox.closes.get(), 1);
}

#[test]
fn test_attachment_failure_keeps_earlier_messages() {
    let mut mailbox = Mailbox {
        with_attachment: true,
        ..Mailbox::with_ids(1..=3)
    };
    mailbox.unseen = vec![1, 2, 3];
    let mailbox = Rc::new(mailbox);

    let temp = tempfile::tempdir().unwrap();
    let dir = temp.path().join("attachments");
    let writer = AttachmentWriter::new(&dir);
    let parser = MessageParser::new(&writer);
    let connector = FakeConnector {
        mailbox: Rc::clone(&mailbox),
    };

    // After two messages the directory turns into a plain file
    let retrieval = retrieve(
        &connector,
        &parser,
        "INBOX",
        RetrieveRequest::unseen_and_mark(limit(10)),
        &|done, _| {
            if done == 2 {
                std::fs::remove_dir_all(&dir).unwrap();
                std::fs::write(&dir, b"gone").unwrap();
            }
        },
    )
    .unwrap();

    let ids: Vec<u32> = retrieval.messages.iter().map(|m| m.id.0).collect();
    assert_eq!(ids, vec![3, 2]);
    assert_eq!(retrieval.failures.len(), 1);
    assert_eq!(retrieval.failures[0].id, MessageId(1));
    assert_eq!(retrieval.failures[0].stage, FailureStage::SaveAttachment);
    assert_eq!(*mailbox.marked.borrow(), vec![3, 2]);
    assert_eq!(mailbox.closes.get(), 1);
}

#[test]
fn test_overlong_attachment_name_is_saved() {
    let mut mailbox = Mailbox::with_ids(1..=3);
    mailbox.unseen = vec![1, 2, 3];
    mailbox
        .attachment_names
        .insert(1, format!("{}.pdf", "a".repeat(300)));
    let mailbox = Rc::new(mailbox);

    let temp = tempfile::tempdir().unwrap();
    let writer = AttachmentWriter::new(temp.path());
    let parser = MessageParser::new(&writer);
    let connector = FakeConnector {
        mailbox: Rc::clone(&mailbox),
    };
    let retrieval = retrieve(
        &connector,
        &parser,
        "INBOX",
        RetrieveRequest::unseen_and_mark(limit(10)),
        &|_, _| {},
    )
    .unwrap();

    let ids: Vec<u32> = retrieval.messages.iter().map(|m| m.id.0).collect();
    assert_eq!(ids, vec![3, 2, 1]);
    assert!(retrieval.failures.is_empty());
    assert_eq!(*mailbox.marked.borrow(), vec![3, 2, 1]);

    let saved = &retrieval.messages[2].attachments;
    assert_eq!(saved.len(), 1);
    let name = saved[0].file_name().unwrap().to_string_lossy();
    assert!(name.len() < 255);
    assert!(name.ends_with(".pdf"));
}

// ─── Attachments and progress ───────────────────────────────────────

#[test]
fn test_attachments_saved_per_message() {
    let mailbox = Rc::new(Mailbox {
        with_attachment: true,
        ..Mailbox::with_ids(1..=2)
    });
    let temp = tempfile::tempdir().unwrap();
    let writer = AttachmentWriter::new(temp.path());
    let parser = MessageParser::new(&writer);
    let connector = FakeConnector {
        mailbox: Rc::clone(&mailbox),
    };
    let retrieval = retrieve(
        &connector,
        &parser,
        "INBOX",
        RetrieveRequest::recent(limit(10)),
        &|_, _| {},
    )
    .unwrap();

    let names: Vec<String> = retrieval
        .messages
        .iter()
        .flat_map(|m| m.attachments.iter())
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["data.bin", "data_1.bin"]);
    assert!(retrieval.messages[0].body_text.contains("body 2"));
}

#[test]
fn test_progress_reports_each_message() {
    let mailbox = Rc::new(Mailbox::with_ids(1..=4));
    let temp = tempfile::tempdir().unwrap();
    let writer = AttachmentWriter::new(temp.path());
    let parser = MessageParser::new(&writer);
    let connector = FakeConnector {
        mailbox: Rc::clone(&mailbox),
    };
    let seen = RefCell::new(Vec::new());
    retrieve(
        &connector,
        &parser,
        "INBOX",
        RetrieveRequest::recent(limit(3)),
        &|done, total| seen.borrow_mut().push((done, total)),
    )
    .unwrap();

    assert_eq!(*seen.borrow(), vec![(1, 3), (2, 3), (3, 3)]);
}
