//! Persist attachment payloads under unique, filesystem-safe names.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{MailError, Result};
use crate::model::attachment::AttachmentRecord;
use crate::parser::header::decode_header_value;

/// Base name used when both the hint and the fallback prefix sanitize to nothing.
const DEFAULT_BASENAME: &str = "attachment";

/// Writes attachments into a single destination directory.
///
/// Existing files are never overwritten: a colliding name gets `_1`, `_2`, ...
/// inserted before its extension.
#[derive(Debug, Clone)]
pub struct AttachmentWriter {
    dir: PathBuf,
}

impl AttachmentWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save one payload and return where it landed.
    ///
    /// `filename_hint` may be MIME-encoded; it is decoded and stripped of
    /// non-printable characters. Without a usable hint `fallback_prefix` is
    /// the file name.
    pub fn save(
        &self,
        filename_hint: Option<&str>,
        payload: &[u8],
        fallback_prefix: &str,
    ) -> Result<AttachmentRecord> {
        std::fs::create_dir_all(&self.dir).map_err(|e| MailError::io(&self.dir, e))?;

        let declared = filename_hint.map(|hint| decode_header_value(Some(hint)));
        let name = declared
            .as_deref()
            .map(sanitize_filename)
            .filter(|n| is_usable_name(n))
            .or_else(|| Some(sanitize_filename(fallback_prefix)).filter(|n| is_usable_name(n)))
            .unwrap_or_else(|| DEFAULT_BASENAME.to_string());

        let path = self.write_unique(&name, payload)?;
        info!(path = %path.display(), bytes = payload.len(), "Saved attachment");

        Ok(AttachmentRecord {
            declared_filename: declared,
            resolved_path: path,
            size: payload.len() as u64,
        })
    }

    /// Create the first free candidate for `name` and write `payload` into it.
    fn write_unique(&self, name: &str, payload: &[u8]) -> Result<PathBuf> {
        let as_path = Path::new(name);
        let stem = as_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(name);
        let ext = as_path.extension().and_then(|e| e.to_str()).unwrap_or("");

        for counter in 0..=u32::MAX {
            let candidate = self.dir.join(candidate_name(name, stem, ext, counter));
            // create_new fails instead of truncating, so a file that appears
            // after the name was chosen is still never overwritten.
            let mut file = match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(path = %candidate.display(), "Attachment name taken");
                    continue;
                }
                Err(e) => return Err(MailError::io(&candidate, e)),
            };

            if let Err(e) = file.write_all(payload).and_then(|_| file.flush()) {
                let _ = std::fs::remove_file(&candidate);
                return Err(MailError::io(&candidate, e));
            }
            return Ok(candidate);
        }

        Err(MailError::io(
            self.dir.join(name),
            std::io::Error::new(ErrorKind::AlreadyExists, "no free attachment name"),
        ))
    }
}

/// Save a single attachment into `destination_dir`; see [`AttachmentWriter::save`].
pub fn save_attachment(
    filename_hint: Option<&str>,
    payload: &[u8],
    fallback_prefix: &str,
    destination_dir: &Path,
) -> Result<PathBuf> {
    AttachmentWriter::new(destination_dir)
        .save(filename_hint, payload, fallback_prefix)
        .map(|record| record.resolved_path)
}

/// `name` for the first attempt, `stem_N.ext` afterwards.
fn candidate_name(name: &str, stem: &str, ext: &str, counter: u32) -> String {
    match (counter, ext.is_empty()) {
        (0, _) => name.to_string(),
        (n, true) => format!("{stem}_{n}"),
        (n, false) => format!("{stem}_{n}.{ext}"),
    }
}

/// Longest name produced, in bytes. Leaves room for a `_N` collision suffix
/// under the usual 255-byte file name limit.
const MAX_NAME_BYTES: usize = 200;

/// A trailing `.ext` longer than this is truncated along with the stem.
const MAX_EXT_BYTES: usize = 16;

/// Strip characters that do not print, neutralize path separators so the
/// name cannot leave the destination directory, and cap the length.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|&c| is_printable(c))
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    truncate_name(cleaned)
}

/// Shorten the stem on a char boundary, keeping a short extension intact.
fn truncate_name(name: String) -> String {
    if name.len() <= MAX_NAME_BYTES {
        return name;
    }
    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 && name.len() - dot <= MAX_EXT_BYTES + 1 => {
            (&name[..dot], &name[dot..])
        }
        _ => (name.as_str(), ""),
    };
    let mut end = (MAX_NAME_BYTES - ext.len()).min(stem.len());
    while !stem.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{ext}", &stem[..end])
}

/// Printable in the Unicode sense: no controls, no separators other than a
/// plain space, no format, private-use or noncharacter code points.
fn is_printable(c: char) -> bool {
    if c == ' ' {
        return true;
    }
    // is_whitespace covers Zs, Zl and Zp
    if c.is_control() || c.is_whitespace() {
        return false;
    }
    !(is_format(c) || is_private_use(c) || is_noncharacter(c))
}

/// General category Cf (soft hyphen, bidi controls, zero-width and tag
/// characters, ...).
fn is_format(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}'
            | '\u{0600}'..='\u{0605}'
            | '\u{061C}'
            | '\u{06DD}'
            | '\u{070F}'
            | '\u{0890}'..='\u{0891}'
            | '\u{08E2}'
            | '\u{180E}'
            | '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{206F}'
            | '\u{FEFF}'
            | '\u{FFF9}'..='\u{FFFB}'
            | '\u{110BD}'
            | '\u{110CD}'
            | '\u{13430}'..='\u{1343F}'
            | '\u{1BCA0}'..='\u{1BCA3}'
            | '\u{1D173}'..='\u{1D17A}'
            | '\u{E0001}'
            | '\u{E0020}'..='\u{E007F}'
    )
}

fn is_private_use(c: char) -> bool {
    matches!(
        c,
        '\u{E000}'..='\u{F8FF}' | '\u{F0000}'..='\u{FFFFD}' | '\u{100000}'..='\u{10FFFD}'
    )
}

fn is_noncharacter(c: char) -> bool {
    matches!(c, '\u{FDD0}'..='\u{FDEF}') || (c as u32 & 0xFFFE) == 0xFFFE
}

fn is_usable_name(name: &str) -> bool {
    !name.trim().is_empty() && name != "." && name != ".."
}
