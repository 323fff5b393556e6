//! Overview format discovery and OVER/XOVER row decoding
//! ([RFC 3977 §8](https://datatracker.ietf.org/doc/html/rfc3977#section-8)).

use std::collections::HashMap;

use crate::error::NntpError;
use crate::model::OverviewEntry;

/// Fields every overview starts with, in order. Used as-is when the server
/// cannot describe its format.
pub const DEFAULT_OVERVIEW_FMT: [&str; 7] = [
    "subject",
    "from",
    "date",
    "message-id",
    "references",
    ":bytes",
    ":lines",
];

pub fn default_overview_fmt() -> Vec<String> {
    DEFAULT_OVERVIEW_FMT.iter().map(|s| s.to_string()).collect()
}

/// Historical spellings of the metadata fields.
fn canonical_name(name: String) -> String {
    match name.as_str() {
        "bytes" => ":bytes".to_string(),
        "lines" => ":lines".to_string(),
        _ => name,
    }
}

/// Parse a `LIST OVERVIEW.FMT` block into field names.
///
/// Header lines look like `Subject:` or `Xref:full`; metadata lines like
/// `:bytes`. Names are lower-cased and the suffix is dropped. The first
/// seven names must match [`DEFAULT_OVERVIEW_FMT`].
pub fn parse_overview_fmt<S: AsRef<str>>(lines: &[S]) -> Result<Vec<String>, NntpError> {
    let mut fmt = Vec::with_capacity(lines.len());
    for line in lines {
        let line = line.as_ref().trim();
        if line.is_empty() {
            continue;
        }
        let name = match line.strip_prefix(':') {
            Some(rest) => {
                let (name, _suffix) = rest.split_once(':').unwrap_or((rest, ""));
                format!(":{name}")
            }
            None => {
                let (name, _suffix) = line.split_once(':').unwrap_or((line, ""));
                name.to_string()
            }
        };
        fmt.push(canonical_name(name.to_lowercase()));
    }

    if fmt.len() < DEFAULT_OVERVIEW_FMT.len() {
        return Err(NntpError::Data("LIST OVERVIEW.FMT response too short".into()));
    }
    if fmt
        .iter()
        .zip(DEFAULT_OVERVIEW_FMT)
        .any(|(got, want)| got != want)
    {
        return Err(NntpError::Data(
            "LIST OVERVIEW.FMT redefines default fields".into(),
        ));
    }
    Ok(fmt)
}

/// Decode OVER/XOVER rows against `fmt`.
///
/// Extra header fields past the defaults arrive as `Name: value`; the prefix
/// is checked and stripped, and an empty token becomes `None`. Tokens past
/// the end of `fmt` are ignored, since some servers append headers they
/// never declared.
pub fn parse_overview<S: AsRef<str>>(
    lines: &[S],
    fmt: &[String],
) -> Result<Vec<OverviewEntry>, NntpError> {
    let n_defaults = DEFAULT_OVERVIEW_FMT.len();
    let mut entries = Vec::with_capacity(lines.len());

    for line in lines {
        let line = line.as_ref();
        let mut tokens = line.split('\t');
        let number = tokens
            .next()
            .and_then(|n| n.trim().parse::<u64>().ok())
            .ok_or_else(|| NntpError::Data(format!("invalid overview line: {line}")))?;

        let mut fields = HashMap::with_capacity(fmt.len());
        for (i, token) in tokens.enumerate() {
            let Some(field_name) = fmt.get(i) else {
                continue;
            };
            let is_metadata = field_name.starts_with(':');
            let value = if i >= n_defaults && !is_metadata {
                strip_header_prefix(field_name, token)?
            } else {
                Some(token.to_string())
            };
            fields.insert(field_name.clone(), value);
        }
        entries.push(OverviewEntry { number, fields });
    }
    Ok(entries)
}

fn strip_header_prefix(field_name: &str, token: &str) -> Result<Option<String>, NntpError> {
    if token.is_empty() {
        return Ok(None);
    }
    let prefix_len = field_name.len() + 2;
    let has_prefix = token
        .get(..prefix_len)
        .is_some_and(|p| p.eq_ignore_ascii_case(&format!("{field_name}: ")));
    if !has_prefix {
        return Err(NntpError::Data(
            "OVER/XOVER response doesn't include names of additional headers".into(),
        ));
    }
    Ok(Some(token[prefix_len..].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT_LINES: [&str; 7] = [
        "Subject:",
        "From:",
        "Date:",
        "Message-ID:",
        "References:",
        ":bytes",
        ":lines",
    ];

    #[test]
    fn default_format_parses_to_defaults() {
        let fmt = parse_overview_fmt(&DEFAULT_LINES).unwrap();
        assert_eq!(fmt, DEFAULT_OVERVIEW_FMT);
    }

    #[test]
    fn legacy_metadata_names_are_normalized() {
        let lines = [
            "Subject:",
            "From:",
            "Date:",
            "Message-ID:",
            "References:",
            "Bytes:",
            "Lines:",
        ];
        let fmt = parse_overview_fmt(&lines).unwrap();
        assert_eq!(fmt, DEFAULT_OVERVIEW_FMT);
    }

    #[test]
    fn extra_fields_keep_their_name_without_suffix() {
        let mut lines = DEFAULT_LINES.to_vec();
        lines.push("Xref:full");
        lines.push(":Lines-Extra:foo");
        let fmt = parse_overview_fmt(&lines).unwrap();
        assert_eq!(fmt.len(), 9);
        assert_eq!(fmt[7], "xref");
        assert_eq!(fmt[8], ":lines-extra");
    }

    #[test]
    fn short_format_is_rejected() {
        let err = parse_overview_fmt(&DEFAULT_LINES[..5]).unwrap_err();
        assert!(matches!(err, NntpError::Data(ref m) if m.contains("too short")));
    }

    #[test]
    fn reordered_defaults_are_rejected() {
        let mut lines = DEFAULT_LINES.to_vec();
        lines.swap(0, 1);
        let err = parse_overview_fmt(&lines).unwrap_err();
        assert!(matches!(err, NntpError::Data(ref m) if m.contains("redefines")));
    }

    #[test]
    fn default_row_decodes_positionally() {
        let fmt = default_overview_fmt();
        let rows = ["3000\tHello\tme@example.com\tMon, 1 Jan 2024\t<a@b>\t<r@b>\t1234\t17"];
        let entries = parse_overview(&rows, &fmt).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.number, 3000);
        assert_eq!(entry.get("subject"), Some("Hello"));
        assert_eq!(entry.get("message-id"), Some("<a@b>"));
        assert_eq!(entry.get(":bytes"), Some("1234"));
        assert_eq!(entry.get(":lines"), Some("17"));
    }

    #[test]
    fn extra_header_prefix_is_stripped() {
        let mut lines = DEFAULT_LINES.to_vec();
        lines.push("Xref:full");
        let fmt = parse_overview_fmt(&lines).unwrap();
        let rows = ["100\tSubj\tA\tD\t<id>\t<refs>\t500\t10\tXref: full xref-value"];
        let entries = parse_overview(&rows, &fmt).unwrap();
        assert_eq!(entries[0].number, 100);
        assert_eq!(entries[0].get("xref"), Some("full xref-value"));
    }

    #[test]
    fn extra_header_prefix_is_case_insensitive() {
        let mut fmt = default_overview_fmt();
        fmt.push("xref".into());
        let rows = ["1\ts\tf\td\t<m>\t\t1\t1\tXREF: host 1"];
        let entries = parse_overview(&rows, &fmt).unwrap();
        assert_eq!(entries[0].get("xref"), Some("host 1"));
    }

    #[test]
    fn empty_extra_header_is_absent() {
        let mut fmt = default_overview_fmt();
        fmt.push("xref".into());
        let rows = ["7\ts\tf\td\t<m>\t\t1\t1\t"];
        let entries = parse_overview(&rows, &fmt).unwrap();
        assert_eq!(entries[0].fields.get("xref"), Some(&None));
        assert_eq!(entries[0].get("references"), Some(""));
    }

    #[test]
    fn extra_header_without_name_is_rejected() {
        let mut fmt = default_overview_fmt();
        fmt.push("xref".into());
        let rows = ["7\ts\tf\td\t<m>\t\t1\t1\tjust-a-value"];
        assert!(matches!(
            parse_overview(&rows, &fmt),
            Err(NntpError::Data(_))
        ));
    }

    #[test]
    fn extra_metadata_field_is_stored_verbatim() {
        let mut fmt = default_overview_fmt();
        fmt.push(":score".into());
        let rows = ["7\ts\tf\td\t<m>\t\t1\t1\t42"];
        let entries = parse_overview(&rows, &fmt).unwrap();
        assert_eq!(entries[0].get(":score"), Some("42"));
    }

    #[test]
    fn undeclared_trailing_tokens_are_ignored() {
        let fmt = default_overview_fmt();
        let rows = ["9\ts\tf\td\t<m>\t\t1\t1\tXref: undeclared\tmore"];
        let entries = parse_overview(&rows, &fmt).unwrap();
        assert_eq!(entries[0].fields.len(), 7);
    }

    #[test]
    fn non_numeric_article_number_is_rejected() {
        let fmt = default_overview_fmt();
        let rows = ["abc\ts\tf\td\t<m>\t\t1\t1"];
        assert!(matches!(
            parse_overview(&rows, &fmt),
            Err(NntpError::Data(_))
        ));
    }
}
