use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Standard port for cleartext NNTP ([RFC 3977 §3](https://datatracker.ietf.org/doc/html/rfc3977#section-3)).
pub const NNTP_PORT: u16 = 119;

/// Standard port for NNTP over implicit TLS.
pub const NNTP_SSL_PORT: u16 = 563;

/// Connection settings for a single news server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsServer {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_encryption")]
    pub encryption: Encryption,
    #[serde(default = "default_true")]
    pub cert_verification: bool,
    /// Send `MODE READER` after the greeting unless the server already
    /// advertises `READER`.
    #[serde(default)]
    pub reader_mode: bool,
    /// Fall back to the [`CredentialStore`](crate::CredentialStore) when no
    /// username is configured.
    #[serde(default)]
    pub use_credential_store: bool,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_encryption() -> Encryption {
    Encryption::None
}

fn default_true() -> bool {
    true
}

impl NewsServer {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: NNTP_PORT,
            username: None,
            password: None,
            encryption: Encryption::None,
            cert_verification: true,
            reader_mode: false,
            use_credential_store: false,
            timeout_secs: None,
        }
    }

    pub fn tls(host: impl Into<String>) -> Self {
        Self {
            port: NNTP_SSL_PORT,
            encryption: Encryption::Tls,
            ..Self::new(host)
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// How the byte stream underneath a session is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encryption {
    /// Plain TCP.
    None,
    /// TLS from the first byte (port 563 style).
    Tls,
    /// Plain TCP upgraded with STARTTLS ([RFC 4642](https://datatracker.ietf.org/doc/html/rfc4642))
    /// right after capability discovery.
    StartTls,
}

/// Decoded NNTP status line.
///
/// Response codes are defined in [RFC 3977 §3.2](https://datatracker.ietf.org/doc/html/rfc3977#section-3.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NntpResponse {
    pub code: u16,
    /// The full status line, code included.
    pub text: String,
}

impl NntpResponse {
    /// Text following the status code.
    pub fn message(&self) -> &str {
        self.text.get(3..).unwrap_or("").trim_start()
    }
}

impl fmt::Display for NntpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// An article addressed either by its group-relative number or by message-id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArticleRef {
    Number(u64),
    MessageId(String),
}

impl ArticleRef {
    /// Wraps `id` in angle brackets unless it already carries them.
    pub fn message_id(id: impl Into<String>) -> Self {
        let id = id.into();
        if id.starts_with('<') && id.ends_with('>') {
            ArticleRef::MessageId(id)
        } else {
            ArticleRef::MessageId(format!("<{id}>"))
        }
    }
}

impl From<u64> for ArticleRef {
    fn from(number: u64) -> Self {
        ArticleRef::Number(number)
    }
}

impl From<&str> for ArticleRef {
    fn from(id: &str) -> Self {
        ArticleRef::message_id(id)
    }
}

impl fmt::Display for ArticleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArticleRef::Number(n) => write!(f, "{n}"),
            ArticleRef::MessageId(id) => f.write_str(id),
        }
    }
}

/// Which articles an `OVER`/`XOVER` request covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverviewRange {
    /// The currently selected article.
    Current,
    /// A single article by message-id. Not understood by `XOVER`.
    MessageId(String),
    /// `start-end`; `end: None` means through the newest article.
    Range { start: u64, end: Option<u64> },
}

impl OverviewRange {
    pub(crate) fn argument(&self) -> Option<String> {
        match self {
            OverviewRange::Current => None,
            OverviewRange::MessageId(id) => Some(id.clone()),
            OverviewRange::Range { start, end } => Some(match end {
                Some(end) => format!("{start}-{end}"),
                None => format!("{start}-"),
            }),
        }
    }
}

/// One line of a `LIST`, `LIST ACTIVE` or `NEWGROUPS` reply.
///
/// Values are kept as the server sent them; they are only interpreted by
/// the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    pub group: String,
    pub last: String,
    pub first: String,
    pub flag: String,
}

impl GroupInfo {
    /// `y` means posting is permitted ([RFC 3977 §7.6.3](https://datatracker.ietf.org/doc/html/rfc3977#section-7.6.3)).
    pub fn posting_allowed(&self) -> bool {
        self.flag.eq_ignore_ascii_case("y")
    }
}

/// Parsed `211` reply to `GROUP`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupStatus {
    pub count: u64,
    pub first: u64,
    pub last: u64,
    pub name: Option<String>,
}

/// Article addressed by `STAT`/`ARTICLE`/`HEAD`/`BODY`, with its lines when
/// they were buffered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleInfo {
    pub number: u64,
    pub message_id: String,
    pub lines: Vec<Vec<u8>>,
}

/// One `OVER`/`XOVER` row.
///
/// Keys are lower-cased header names, or metadata names such as `:bytes`.
/// `None` marks an optional header the server sent as empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverviewEntry {
    pub number: u64,
    pub fields: HashMap<String, Option<String>>,
}

impl OverviewEntry {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(|v| v.as_deref())
    }
}

/// One `XHDR` result line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XhdrLine {
    Article { number: u64, value: String },
    /// A line that did not start with an article number.
    Unparsed(String),
}
