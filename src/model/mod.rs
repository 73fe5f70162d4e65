//! Core data model types for retrieved messages and saved attachments.

pub mod attachment;
pub mod message;
