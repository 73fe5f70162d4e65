//! RFC 5322 header handling: header block splitting, unfolding and
//! RFC 2047 encoded-word decoding.

use base64::Engine;
use tracing::warn;

use super::charset::decode_with_charset;

/// The unfolded header section of a raw message.
#[derive(Debug, Clone, Default)]
pub struct RawHeaders {
    fields: Vec<(String, String)>,
}

impl RawHeaders {
    /// Parse the header section of `raw`.
    ///
    /// Returns the headers and the byte offset where the body starts.
    pub fn parse(raw: &[u8]) -> (Self, usize) {
        let (header_bytes, body_start) = split_header_block(raw);
        let text = decode_header_bytes(header_bytes);
        let fields = unfold_headers(&text);
        (Self { fields }, body_start)
    }

    /// First value for a header name (case-insensitive), still encoded.
    pub fn get(&self, name: &str) -> Option<&str> {
        get_header(&self.fields, &name.to_lowercase())
    }
}

/// Decode a header value for display.
///
/// Absent input yields an empty string. Encoded words are decoded and
/// concatenated with the plain segments around them; anything that cannot be
/// decoded is kept as literal text.
pub fn decode_header_value(raw: Option<&str>) -> String {
    match raw {
        Some(value) => decode_encoded_words(value),
        None => String::new(),
    }
}

/// Split raw message bytes into the header block and the body offset.
///
/// Without a blank line the whole input is treated as headers.
fn split_header_block(data: &[u8]) -> (&[u8], usize) {
    for i in 0..data.len().saturating_sub(1) {
        if data[i] == b'\n' && data[i + 1] == b'\n' {
            return (&data[..i], i + 2);
        }
        if i + 3 < data.len()
            && data[i] == b'\r'
            && data[i + 1] == b'\n'
            && data[i + 2] == b'\r'
            && data[i + 3] == b'\n'
        {
            return (&data[..i], i + 4);
        }
    }
    (data, data.len())
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
fn decode_header_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Unfold headers: join continuation lines (starting with space or tab) with the previous header.
///
/// Returns a list of `(lowercase_name, raw_value)` pairs.
fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
            }
        } else if let Some(colon_pos) = line.find(':') {
            let name = line[..colon_pos].trim().to_lowercase();
            let value = line[colon_pos + 1..].trim().to_string();
            result.push((name, value));
        }
        // Lines without a colon and not a continuation are silently skipped
    }

    result
}

fn get_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// If decoding fails for any token, the original text is preserved.
pub fn decode_encoded_words(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        let after_start = &remaining[start + 2..];
        let word = try_decode_one_word(after_start);

        // Whitespace between two encoded words is not part of the text (RFC 2047 §6.2)
        if !(last_was_encoded && word.is_some() && before.trim().is_empty()) {
            result.push_str(before);
        }

        if let Some(decoded) = word {
            result.push_str(&decoded.text);
            remaining = &remaining[start + 2 + decoded.consumed..];
            last_was_encoded = true;
        } else {
            result.push_str("=?");
            remaining = after_start;
            last_was_encoded = false;
        }
    }

    result.push_str(remaining);
    result
}

struct DecodedWord {
    text: String,
    consumed: usize, // bytes consumed from the string *after* the initial "=?"
}

fn try_decode_one_word(s: &str) -> Option<DecodedWord> {
    // Format: charset?encoding?encoded_text?=
    let first_q = s.find('?')?;
    let charset = &s[..first_q];
    if charset.is_empty() || charset.contains(char::is_whitespace) {
        return None;
    }

    let rest = &s[first_q + 1..];
    let second_q = rest.find('?')?;
    let encoding = &rest[..second_q];

    let rest2 = &rest[second_q + 1..];
    let end = rest2.find("?=")?;
    let encoded_text = &rest2[..end];

    let total_consumed = first_q + 1 + second_q + 1 + end + 2;

    // RFC 2231 allows a language suffix: "utf-8*en"
    let charset = charset.split('*').next().unwrap_or(charset);
    if encoding_rs::Encoding::for_label(charset.trim().as_bytes()).is_none() {
        warn!(charset = charset, "Unsupported charset in encoded-word, kept literal");
        return None;
    }

    let bytes = match encoding.to_ascii_uppercase().as_str() {
        "B" => decode_b_encoding(encoded_text)?,
        "Q" => decode_q_encoding(encoded_text),
        _ => return None,
    };

    let decoded = decode_with_charset(Some(charset), &bytes);
    if decoded.lossy {
        warn!(charset = charset, "Lossy decode of encoded-word");
    }

    Some(DecodedWord {
        text: decoded.text,
        consumed: total_consumed,
    })
}

/// Decode B-encoding (base64), tolerating missing padding.
fn decode_b_encoding(input: &str) -> Option<Vec<u8>> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .or_else(|_| {
            base64::engine::general_purpose::STANDARD_NO_PAD
                .decode(compact.trim_end_matches('=').as_bytes())
        })
        .ok()
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len()
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit() =>
            {
                result.push((hex_val(bytes[i + 1]) << 4) | hex_val(bytes[i + 2]));
                i += 3;
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

fn hex_val(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => 0,
    }
}
