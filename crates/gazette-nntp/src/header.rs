//! Decoding of MIME encoded words in header values
//! ([RFC 2047](https://datatracker.ietf.org/doc/html/rfc2047)).

use std::sync::LazyLock;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use encoding_rs::Encoding;
use regex::Regex;

static ENCODED_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"=\?([^?\s]+)\?([BbQq])\?([^?\s]*)\?=").expect("valid regex")
});

/// Turn a header value such as an overview `subject` into readable text.
///
/// Encoded words are decoded with their declared charset, by any label
/// the WHATWG Encoding Standard knows. Words with an unknown charset, or
/// whose bytes are invalid in it, are kept verbatim.
/// Whitespace separating two decoded words is dropped.
pub fn decode_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_end = 0;
    let mut prev_decoded = false;

    for caps in ENCODED_WORD_RE.captures_iter(value) {
        let Some(word) = caps.get(0) else {
            continue;
        };
        let gap = &value[last_end..word.start()];
        let decoded = decode_word(&caps[1], &caps[2], &caps[3]);

        if !(prev_decoded && decoded.is_some() && gap.chars().all(char::is_whitespace)) {
            out.push_str(gap);
        }
        match decoded {
            Some(text) => {
                out.push_str(&text);
                prev_decoded = true;
            }
            None => {
                out.push_str(word.as_str());
                prev_decoded = false;
            }
        }
        last_end = word.end();
    }
    out.push_str(&value[last_end..]);
    out
}

fn decode_word(charset: &str, encoding: &str, text: &str) -> Option<String> {
    let bytes = if encoding.eq_ignore_ascii_case("b") {
        BASE64.decode(text).ok()?
    } else {
        decode_q(text)?
    };
    // RFC 2231 allows a language tag after the charset: `utf-8*en`.
    let charset = charset.split('*').next().unwrap_or(charset);
    // WHATWG maps the ASCII labels onto windows-1252; keep them strict.
    if charset.eq_ignore_ascii_case("us-ascii") || charset.eq_ignore_ascii_case("ascii") {
        return bytes.is_ascii().then(|| bytes.iter().map(|&b| b as char).collect());
    }
    let encoding = Encoding::for_label(charset.as_bytes())?;
    encoding
        .decode_without_bom_handling_and_without_replacement(&bytes)
        .map(|text| text.into_owned())
}

fn decode_q(text: &str) -> Option<Vec<u8>> {
    let src = text.as_bytes();
    let mut out = Vec::with_capacity(src.len());
    let mut i = 0;
    while i < src.len() {
        match src[i] {
            b'_' => out.push(b' '),
            b'=' => {
                let hex = text.get(i + 1..i + 3)?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    Some(out)
}
