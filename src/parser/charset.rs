//! Best-effort charset decoding.

use tracing::warn;

/// Text produced by a best-effort decode.
///
/// `lossy` is set when bytes had to be replaced or the declared charset was
/// unknown and UTF-8 was assumed instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    pub lossy: bool,
}

/// Decode `bytes` using a declared charset label.
///
/// A missing label means UTF-8. Unknown labels fall back to UTF-8 with
/// replacement characters. This never fails.
pub fn decode_with_charset(charset: Option<&str>, bytes: &[u8]) -> DecodedText {
    let label = charset.map(str::trim).filter(|c| !c.is_empty());

    let encoding = match label {
        None => encoding_rs::UTF_8,
        Some(label) => match encoding_rs::Encoding::for_label(label.as_bytes()) {
            Some(encoding) => encoding,
            None => {
                warn!(
                    charset = label,
                    "Unknown charset, falling back to UTF-8 lossy"
                );
                let text = String::from_utf8_lossy(bytes).into_owned();
                return DecodedText { text, lossy: true };
            }
        },
    };

    // The declared label is authoritative; a BOM must not override it.
    let (decoded, had_errors) = encoding.decode_without_bom_handling(bytes);
    DecodedText {
        text: decoded.into_owned(),
        lossy: had_errors,
    }
}
