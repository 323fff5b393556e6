//! Session state for an NNTP client ([RFC 3977 §5](https://datatracker.ietf.org/doc/html/rfc3977#section-5)).
//!
//! Holds everything a session learns about the server and itself, without
//! performing I/O. The session is the only writer.

use std::collections::HashMap;

use crate::error::NntpError;
use crate::model::NntpResponse;

/// Capability name to its argument tokens, as sent by `CAPABILITIES`.
pub type Capabilities = HashMap<String, Vec<String>>;

/// What came of a `MODE READER` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderMode {
    /// The server switched modes; capabilities may have changed.
    Accepted,
    /// `5xx`: the server has no separate reader mode.
    Unsupported,
    /// `480`: retry once logged in.
    Deferred,
}

#[derive(Debug)]
pub struct SessionState {
    welcome: String,
    capabilities: Option<Capabilities>,
    version: u32,
    implementation: Option<String>,
    tls_active: bool,
    authenticated: bool,
    reader_mode_after_auth: bool,
    overview_fmt: Option<Vec<String>>,
}

impl SessionState {
    pub fn new(welcome: String) -> Self {
        Self {
            welcome,
            capabilities: None,
            version: 1,
            implementation: None,
            tls_active: false,
            authenticated: false,
            reader_mode_after_auth: false,
            overview_fmt: None,
        }
    }

    pub fn welcome(&self) -> &str {
        &self.welcome
    }

    /// `200` greets a client allowed to post; `201` a read-only one.
    pub fn posting_allowed(&self) -> bool {
        self.welcome.starts_with("200")
    }

    pub fn capabilities(&self) -> Option<&Capabilities> {
        self.capabilities.as_ref()
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities
            .as_ref()
            .is_some_and(|caps| caps.contains_key(name))
    }

    /// Forget the capability list after an event that may change it
    /// (MODE READER, login, STARTTLS).
    pub fn invalidate_capabilities(&mut self) {
        self.capabilities = None;
        self.version = 1;
        self.implementation = None;
    }

    /// Replace the capability list in one step and derive the protocol
    /// version and implementation string from it.
    pub fn record_capabilities(&mut self, caps: Capabilities) {
        self.version = caps
            .get("VERSION")
            .and_then(|tokens| tokens.iter().filter_map(|t| t.parse::<u32>().ok()).max())
            .unwrap_or(1);
        self.implementation = caps.get("IMPLEMENTATION").map(|tokens| tokens.join(" "));
        self.capabilities = Some(caps);
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn implementation(&self) -> Option<&str> {
        self.implementation.as_deref()
    }

    pub fn tls_active(&self) -> bool {
        self.tls_active
    }

    pub fn mark_tls_active(&mut self) {
        self.tls_active = true;
    }

    pub fn authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn mark_authenticated(&mut self) {
        self.authenticated = true;
    }

    pub fn reader_mode_deferred(&self) -> bool {
        self.reader_mode_after_auth
    }

    pub fn overview_fmt(&self) -> Option<&[String]> {
        self.overview_fmt.as_deref()
    }

    pub fn cache_overview_fmt(&mut self, fmt: Vec<String>) {
        self.overview_fmt = Some(fmt);
    }

    /// STARTTLS is refused once TLS is up or the client has logged in
    /// ([RFC 4642 §2.2.2](https://datatracker.ietf.org/doc/html/rfc4642#section-2.2.2)).
    pub fn check_starttls(&self) -> Result<(), NntpError> {
        if self.tls_active {
            return Err(NntpError::InvalidState("TLS is already enabled".into()));
        }
        if self.authenticated {
            return Err(NntpError::InvalidState(
                "TLS cannot be started after authentication".into(),
            ));
        }
        Ok(())
    }

    pub fn check_login(&self) -> Result<(), NntpError> {
        if self.authenticated {
            return Err(NntpError::InvalidState("already logged in".into()));
        }
        Ok(())
    }

    /// Interpret the reply to `MODE READER`.
    ///
    /// A permanent failure means the server has no reader mode. A `480`
    /// means it wants credentials first, which is remembered so login can
    /// retry. Any other temporary failure is returned to the caller.
    pub fn handle_reader_mode(
        &mut self,
        reply: Result<NntpResponse, NntpError>,
    ) -> Result<ReaderMode, NntpError> {
        match reply {
            Ok(resp) => {
                self.welcome = resp.text;
                Ok(ReaderMode::Accepted)
            }
            Err(NntpError::Permanent(_)) => Ok(ReaderMode::Unsupported),
            Err(NntpError::Temporary(resp)) if resp.starts_with("480") => {
                self.reader_mode_after_auth = true;
                Ok(ReaderMode::Deferred)
            }
            Err(err) => Err(err),
        }
    }
}

/// Parse `CAPABILITIES` block lines into a capability map.
///
/// Blank lines are skipped; the first token is the capability name.
pub fn parse_capabilities<S: AsRef<str>>(lines: &[S]) -> Capabilities {
    let mut caps = Capabilities::new();
    for line in lines {
        let mut tokens = line.as_ref().split_whitespace();
        let Some(name) = tokens.next() else {
            continue;
        };
        caps.insert(name.to_string(), tokens.map(str::to_string).collect());
    }
    caps
}
