//! NNTP (Network News Transfer Protocol) client protocol engine.
//!
//! Covers the reader side of the protocol:
//! - Connection, greeting and capability discovery ([RFC 3977 §5](https://datatracker.ietf.org/doc/html/rfc3977#section-5))
//! - Status-line classification and multi-line dot-stuffed blocks ([RFC 3977 §3.1](https://datatracker.ietf.org/doc/html/rfc3977#section-3.1))
//! - Authentication via AUTHINFO USER/PASS ([RFC 4643 §2.3](https://datatracker.ietf.org/doc/html/rfc4643#section-2.3))
//! - STARTTLS upgrade ([RFC 4642](https://datatracker.ietf.org/doc/html/rfc4642))
//! - Group, article, listing, overview and posting commands ([RFC 3977 §6-8](https://datatracker.ietf.org/doc/html/rfc3977#section-6))
//! - The common extensions XHDR, XOVER and XGTITLE ([RFC 2980](https://datatracker.ietf.org/doc/html/rfc2980))

mod channel;
mod commands;
mod credentials;
pub mod datetime;
mod error;
pub mod header;
mod model;
pub mod overview;
pub mod response;
mod session;
mod sink;
mod state;
mod tls;

pub use crate::channel::{LineChannel, MAX_LINE, NntpIo};
pub use crate::credentials::{CredentialStore, Credentials, StaticCredentials};
pub use crate::error::{ErrorKind, NntpError};
pub use crate::header::decode_header;
pub use crate::model::{
    ArticleInfo, ArticleRef, Encryption, GroupInfo, GroupStatus, NNTP_PORT, NNTP_SSL_PORT,
    NewsServer, NntpResponse, OverviewEntry, OverviewRange, XhdrLine,
};
pub use crate::session::NntpSession;
pub use crate::sink::{BodySink, LineBuffer, WriterSink};
pub use crate::state::{Capabilities, ReaderMode, SessionState};
pub use crate::tls::build_tls_config;
