//! Status-line classification and multi-line block framing
//! ([RFC 3977 §3.1](https://datatracker.ietf.org/doc/html/rfc3977#section-3.1)).
//!
//! Pure functions only; the session feeds them lines read off the wire.

use crate::error::NntpError;
use crate::model::NntpResponse;

/// Status codes that are followed by a dot-terminated block.
pub const LONG_RESPONSE_CODES: &[u16] = &[
    100, // HELP
    101, // CAPABILITIES
    211, // LISTGROUP (GROUP itself is single-line)
    215, // LIST
    220, // ARTICLE
    221, // HEAD, XHDR
    222, // BODY
    224, // OVER, XOVER
    225, // HDR
    230, // NEWNEWS
    231, // NEWGROUPS
    282, // XGTITLE
];

const CRLF: &[u8] = b"\r\n";

pub fn is_long_response(code: u16) -> bool {
    LONG_RESPONSE_CODES.contains(&code)
}

/// Classify a status line by its leading digit.
///
/// `1xx`-`3xx` succeed; `4xx` and `5xx` become [`NntpError::Temporary`] and
/// [`NntpError::Permanent`]; anything else, the empty line included, is a
/// protocol violation. Every error carries the full line.
///
/// Only the first character decides the class. A successful line whose
/// first three characters are not all digits gets code `0`, which no
/// command accepts.
pub fn parse_response(line: &[u8]) -> Result<NntpResponse, NntpError> {
    let text = String::from_utf8_lossy(line).into_owned();
    match text.as_bytes().first() {
        Some(b'4') => Err(NntpError::Temporary(text)),
        Some(b'5') => Err(NntpError::Permanent(text)),
        Some(b'1'..=b'3') => Ok(NntpResponse {
            code: status_code(&text),
            text,
        }),
        _ => Err(NntpError::Protocol(text)),
    }
}

fn status_code(text: &str) -> u16 {
    text.get(..3)
        .filter(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(0)
}

/// Remove one line terminator (CRLF, CR or LF), never more.
pub fn trim_crlf(buf: &[u8]) -> &[u8] {
    let mut end = buf.len();
    if end > 0 && buf[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && buf[end - 1] == b'\r' {
        end -= 1;
    }
    &buf[..end]
}

/// A line consisting of a single dot ends a multi-line block, whichever
/// terminator follows it.
pub fn is_body_terminator(line: &[u8]) -> bool {
    trim_crlf(line) == b"."
}

/// Undo dot-stuffing on one block line (terminator is left in place).
pub fn unstuff(line: &[u8]) -> &[u8] {
    if line.first() == Some(&b'.') {
        &line[1..]
    } else {
        line
    }
}

/// Prepare one article line for POST/IHAVE: ensure it ends in CRLF and
/// double a leading dot.
pub fn stuff_line(line: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(line.len() + 3);
    if line.first() == Some(&b'.') {
        out.push(b'.');
    }
    if line.ends_with(CRLF) {
        out.extend_from_slice(line);
    } else {
        let end = line
            .iter()
            .rposition(|&b| b != b'\r' && b != b'\n')
            .map_or(0, |pos| pos + 1);
        out.extend_from_slice(&line[..end]);
        out.extend_from_slice(CRLF);
    }
    out
}

/// Split a raw article on CRLF, LF or CR. A trailing terminator does not
/// produce an empty final line.
pub fn split_lines(data: &[u8]) -> Vec<&[u8]> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            b'\r' => {
                lines.push(&data[start..i]);
                if data.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
                start = i + 1;
            }
            b'\n' => {
                lines.push(&data[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    if start < data.len() {
        lines.push(&data[start..]);
    }
    lines
}
