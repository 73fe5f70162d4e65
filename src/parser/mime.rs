//! MIME message parsing: part-tree traversal, body extraction and attachment saving.

use mail_parser::{Message, MessagePart, MimeHeaders, PartType};
use tracing::{debug, warn};

use crate::error::Result;
use crate::export::attachment::AttachmentWriter;
use crate::model::message::{MessageId, ParsedMessage};

use super::charset::{decode_with_charset, DecodedText};
use super::header::{decode_header_value, RawHeaders};

/// Maximum nesting depth followed while walking multiparts and embedded
/// messages (to prevent stack overflow on adversarial input).
const MAX_DEPTH: usize = 32;

/// Read-only view of one MIME part.
#[derive(Clone, Copy)]
pub struct PartView<'a, 'x> {
    part: &'a MessagePart<'x>,
}

impl<'a, 'x> PartView<'a, 'x> {
    fn new(part: &'a MessagePart<'x>) -> Self {
        Self { part }
    }

    /// `true` for parts whose payload is other parts rather than content.
    ///
    /// An embedded `message/rfc822` counts as a container unless it is
    /// itself disposed as an attachment.
    pub fn is_container(&self) -> bool {
        match &self.part.body {
            PartType::Multipart(_) => true,
            PartType::Message(_) => !self.is_attachment(),
            _ => false,
        }
    }

    /// Lowercase `type/subtype`. Parts without a `Content-Type` are `text/plain`.
    pub fn content_type(&self) -> String {
        self.part
            .content_type()
            .map(|ct| match ct.subtype() {
                Some(sub) => format!("{}/{}", ct.ctype(), sub),
                None => ct.ctype().to_string(),
            })
            .map(|ct| ct.to_ascii_lowercase())
            .unwrap_or_else(|| "text/plain".to_string())
    }

    /// Lowercase disposition type (`inline`, `attachment`, ...), if declared.
    pub fn disposition(&self) -> Option<String> {
        self.part
            .content_disposition()
            .map(|d| d.ctype().to_ascii_lowercase())
    }

    /// Declared filename, from `Content-Disposition: filename` or
    /// `Content-Type: name`.
    pub fn filename(&self) -> Option<&'a str> {
        self.part.attachment_name().filter(|n| !n.trim().is_empty())
    }

    /// Transfer-decoded payload bytes.
    pub fn payload(&self) -> &'a [u8] {
        self.part.contents()
    }

    pub fn is_attachment(&self) -> bool {
        self.filename().is_some()
            || self
                .disposition()
                .is_some_and(|d| d.contains("attachment"))
    }

    /// Payload as text, using the declared charset when the part was not
    /// already decoded to text.
    pub fn text(&self) -> DecodedText {
        match &self.part.body {
            PartType::Text(text) | PartType::Html(text) => DecodedText {
                text: text.to_string(),
                lossy: self.part.is_encoding_problem,
            },
            _ => {
                let charset = self
                    .part
                    .content_type()
                    .and_then(|ct| ct.attribute("charset"));
                decode_with_charset(charset, self.payload())
            }
        }
    }
}

/// Collect the leaves of the part tree rooted at `part_id`, in document order.
fn collect_leaves<'a, 'x>(
    message: &'a Message<'x>,
    part_id: usize,
    depth: usize,
    leaves: &mut Vec<PartView<'a, 'x>>,
) {
    let Some(part) = message.parts.get(part_id) else {
        return;
    };
    let view = PartView::new(part);

    if !view.is_container() {
        leaves.push(view);
        return;
    }
    if depth >= MAX_DEPTH {
        warn!(depth, "MIME nesting too deep, skipping subtree");
        return;
    }

    match &part.body {
        PartType::Multipart(children) => {
            for &child in children {
                collect_leaves(message, child, depth + 1, leaves);
            }
        }
        PartType::Message(inner) => collect_leaves(inner, 0, depth + 1, leaves),
        _ => {}
    }
}

/// Turns raw fetched bytes into a [`ParsedMessage`], saving attachments as
/// it goes.
pub struct MessageParser<'w> {
    writer: &'w AttachmentWriter,
}

impl<'w> MessageParser<'w> {
    pub fn new(writer: &'w AttachmentWriter) -> Self {
        Self { writer }
    }

    /// Parse one raw message.
    ///
    /// Decoding problems never fail this call; they are logged and replaced
    /// with best-effort text. The only error is a failure to write an
    /// attachment to disk.
    pub fn parse_message(&self, raw: &[u8], id: MessageId) -> Result<ParsedMessage> {
        let (headers, body_start) = RawHeaders::parse(raw);

        let mut parsed = ParsedMessage {
            id,
            sender: decode_header_value(headers.get("from")),
            subject: decode_header_value(headers.get("subject")),
            date: headers.get("date").unwrap_or_default().to_string(),
            body_text: String::new(),
            attachments: Vec::new(),
        };

        let Some(message) = mail_parser::MessageParser::default().parse(raw) else {
            warn!(%id, "Message could not be parsed as MIME, using raw body");
            parsed.body_text = String::from_utf8_lossy(&raw[body_start..]).into_owned();
            return Ok(parsed);
        };

        let Some(root) = message.parts.first().map(PartView::new) else {
            return Ok(parsed);
        };

        if !root.is_container() {
            if !root.payload().is_empty() {
                parsed.body_text = self.decode_body(&root, id).text;
            }
            return Ok(parsed);
        }

        let mut leaves = Vec::new();
        collect_leaves(&message, 0, 0, &mut leaves);
        debug!(%id, leaves = leaves.len(), "Walking MIME leaves");

        let fallback_prefix = format!("attach_{id}");
        for leaf in leaves {
            if leaf.payload().is_empty() {
                continue;
            }
            if leaf.is_attachment() {
                let record = self
                    .writer
                    .save(leaf.filename(), leaf.payload(), &fallback_prefix)?;
                parsed.attachments.push(record.resolved_path);
            } else if leaf.content_type() == "text/plain" {
                let decoded = self.decode_body(&leaf, id);
                parsed.body_text.push_str(&decoded.text);
            }
        }

        Ok(parsed)
    }

    fn decode_body(&self, part: &PartView<'_, '_>, id: MessageId) -> DecodedText {
        let decoded = part.text();
        if decoded.lossy {
            warn!(%id, content_type = %part.content_type(), "Body text decoded with replacements");
        }
        decoded
    }
}
