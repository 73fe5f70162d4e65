//! `mailtide`: a minimal terminal mail client.
//!
//! This crate provides the library behind the CLI: sending messages over
//! SMTP, retrieving recent messages over IMAP, decoding their headers and
//! MIME bodies, and saving attachments to disk.

pub mod config;
pub mod error;
pub mod export;
pub mod i18n;
pub mod mailbox;
pub mod model;
pub mod parser;
pub mod retrieve;
pub mod send;
