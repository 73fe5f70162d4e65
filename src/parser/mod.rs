//! Message decoding: charsets, RFC 2047 headers and the MIME part tree.

pub mod charset;
pub mod header;
pub mod mime;
