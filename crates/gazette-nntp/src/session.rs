//! NNTP client session.
//!
//! Drives the line channel, keeps [`SessionState`] up to date and performs
//! the session lifecycle of [RFC 3977 §5](https://datatracker.ietf.org/doc/html/rfc3977#section-5):
//! greeting, capability discovery, `MODE READER`, STARTTLS
//! ([RFC 4642](https://datatracker.ietf.org/doc/html/rfc4642)) and
//! `AUTHINFO USER/PASS` ([RFC 4643 §2.3](https://datatracker.ietf.org/doc/html/rfc4643#section-2.3)).
//!
//! Every method takes `&mut self` and waits for the whole reply before
//! returning, so commands never overlap on one session.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_rustls::rustls::ClientConfig;

use crate::channel::{LineChannel, NntpIo, with_timeout};
use crate::credentials::{CredentialStore, Credentials};
use crate::error::NntpError;
use crate::model::{Encryption, NewsServer, NntpResponse};
use crate::response::{is_body_terminator, is_long_response, parse_response, unstuff};
use crate::sink::{BodySink, LineBuffer};
use crate::state::{Capabilities, ReaderMode, SessionState, parse_capabilities};
use crate::tls::{build_tls_config, tls_connect};

pub struct NntpSession {
    host: String,
    channel: LineChannel,
    state: SessionState,
    timeout: Option<Duration>,
    credentials: Option<Arc<dyn CredentialStore>>,
}

impl NntpSession {
    /// Connect to `server` and run the full setup sequence.
    ///
    /// See [`connect_with`](Self::connect_with).
    pub async fn connect(server: &NewsServer) -> Result<Self, NntpError> {
        Self::connect_with(server, None, None).await
    }

    /// Connect to `server`, optionally reusing a TLS configuration and
    /// consulting a credential store.
    ///
    /// The transport is plain TCP, TLS from the first byte, or TCP upgraded
    /// with STARTTLS, depending on [`NewsServer::encryption`]. The optional
    /// timeout bounds the TCP connect, the TLS handshake and each line read
    /// or written afterwards.
    pub async fn connect_with(
        server: &NewsServer,
        tls_config: Option<Arc<ClientConfig>>,
        credentials: Option<Arc<dyn CredentialStore>>,
    ) -> Result<Self, NntpError> {
        let timeout = server.timeout();
        check_timeout(timeout)?;

        let tcp = with_timeout(
            timeout,
            TcpStream::connect((server.host.as_str(), server.port)),
        )
        .await?;
        tracing::debug!(host = %server.host, port = server.port, "connected");

        let io: Box<dyn NntpIo> = match server.encryption {
            Encryption::Tls => {
                let config = match tls_config.clone() {
                    Some(config) => config,
                    None => build_tls_config(server.cert_verification)?,
                };
                tls_connect(Box::new(tcp), &server.host, config, timeout).await?
            }
            Encryption::None | Encryption::StartTls => Box::new(tcp),
        };

        let mut session = Self::establish(io, server, tls_config, credentials).await?;
        if server.encryption == Encryption::Tls {
            session.state.mark_tls_active();
        }
        Ok(session)
    }

    /// Run the setup sequence over an already connected stream: greeting,
    /// capabilities, optional `MODE READER`, optional STARTTLS, optional
    /// login. The stream is closed if any step fails.
    pub async fn establish(
        io: Box<dyn NntpIo>,
        server: &NewsServer,
        tls_config: Option<Arc<ClientConfig>>,
        credentials: Option<Arc<dyn CredentialStore>>,
    ) -> Result<Self, NntpError> {
        let mut session = Self::from_stream(io, &server.host, server.timeout()).await?;
        session.credentials = credentials;

        match session.setup(server, tls_config).await {
            Ok(()) => Ok(session),
            Err(err) => {
                if let Err(close_err) = session.close().await {
                    tracing::debug!(error = %close_err, "close after failed setup");
                }
                Err(err)
            }
        }
    }

    /// Wrap a connected stream and read the greeting. Nothing else is sent.
    pub async fn from_stream(
        io: Box<dyn NntpIo>,
        host: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, NntpError> {
        check_timeout(timeout)?;
        let mut channel = LineChannel::new(io, timeout);
        let line = channel.read_line(true).await?;
        let welcome = parse_response(&line)?;
        tracing::debug!(welcome = %welcome, "server greeting");

        Ok(Self {
            host: host.to_string(),
            channel,
            state: SessionState::new(welcome.text),
            timeout,
            credentials: None,
        })
    }

    async fn setup(
        &mut self,
        server: &NewsServer,
        tls_config: Option<Arc<ClientConfig>>,
    ) -> Result<(), NntpError> {
        self.capabilities().await?;

        if server.reader_mode
            && !self.state.has_capability("READER")
            && self.set_reader_mode().await? == ReaderMode::Accepted
        {
            self.refresh_capabilities().await?;
        }

        if server.encryption == Encryption::StartTls {
            let config = match tls_config {
                Some(config) => config,
                None => build_tls_config(server.cert_verification)?,
            };
            self.starttls(Some(config)).await?;
        }

        let has_user = server.username.as_deref().is_some_and(|u| !u.is_empty());
        if has_user || server.use_credential_store {
            self.login(
                server.username.as_deref(),
                server.password.as_deref(),
                server.use_credential_store,
            )
            .await?;
        }
        Ok(())
    }

    pub fn set_credential_store(&mut self, store: Arc<dyn CredentialStore>) {
        self.credentials = Some(store);
    }

    /// Greeting line, or the reply to a successful `MODE READER`.
    pub fn welcome(&self) -> &str {
        self.state.welcome()
    }

    pub fn posting_allowed(&self) -> bool {
        self.state.posting_allowed()
    }

    /// Highest advertised `VERSION`; 1 until capabilities are known.
    pub fn version(&self) -> u32 {
        self.state.version()
    }

    pub fn implementation(&self) -> Option<&str> {
        self.state.implementation()
    }

    pub fn tls_active(&self) -> bool {
        self.state.tls_active()
    }

    pub fn authenticated(&self) -> bool {
        self.state.authenticated()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    pub(crate) async fn send_command(&mut self, command: &str) -> Result<(), NntpError> {
        if command
            .get(..13)
            .is_some_and(|p| p.eq_ignore_ascii_case("authinfo pass"))
        {
            tracing::debug!(command = "authinfo pass ****", ">>");
        } else {
            tracing::debug!(command, ">>");
        }
        self.channel.write_line(command.as_bytes()).await
    }

    /// Read and classify one status line.
    pub(crate) async fn get_response(&mut self) -> Result<NntpResponse, NntpError> {
        let line = self.channel.read_line(true).await?;
        parse_response(&line)
    }

    /// Read a status line that must announce a block, then feed every
    /// unstuffed block line to `sink` until the lone dot.
    pub(crate) async fn get_long_response(
        &mut self,
        sink: &mut dyn BodySink,
    ) -> Result<NntpResponse, NntpError> {
        let resp = self.get_response().await?;
        if !is_long_response(resp.code) {
            return Err(NntpError::Reply(resp.text));
        }
        loop {
            let line = self.channel.read_line(false).await?;
            if is_body_terminator(&line) {
                break;
            }
            sink.append(unstuff(&line)).await?;
        }
        Ok(resp)
    }

    /// Write pre-framed bytes, such as a stuffed article, and flush.
    pub(crate) async fn write_block(&mut self, data: &[u8]) -> Result<(), NntpError> {
        self.channel.write_raw(data).await?;
        self.channel.flush().await
    }

    pub(crate) async fn short_command(&mut self, command: &str) -> Result<NntpResponse, NntpError> {
        self.send_command(command).await?;
        self.get_response().await
    }

    pub(crate) async fn long_command(
        &mut self,
        command: &str,
        sink: &mut dyn BodySink,
    ) -> Result<NntpResponse, NntpError> {
        self.send_command(command).await?;
        self.get_long_response(sink).await
    }

    pub(crate) async fn long_command_lines(
        &mut self,
        command: &str,
    ) -> Result<(NntpResponse, Vec<Vec<u8>>), NntpError> {
        let mut buffer = LineBuffer::new();
        let resp = self.long_command(command, &mut buffer).await?;
        Ok((resp, buffer.into_lines()))
    }

    pub(crate) async fn long_command_strings(
        &mut self,
        command: &str,
    ) -> Result<(NntpResponse, Vec<String>), NntpError> {
        let mut buffer = LineBuffer::new();
        let resp = self.long_command(command, &mut buffer).await?;
        Ok((resp, buffer.into_strings()))
    }

    /// Server capabilities ([RFC 3977 §5.2](https://datatracker.ietf.org/doc/html/rfc3977#section-5.2)).
    ///
    /// Fetched on first use and after any event that invalidates them. A
    /// server that refuses `CAPABILITIES` is treated as advertising nothing.
    pub async fn capabilities(&mut self) -> Result<&Capabilities, NntpError> {
        if self.state.capabilities().is_none() {
            let caps = match self.long_command_strings("CAPABILITIES").await {
                Ok((_, lines)) => parse_capabilities(&lines),
                Err(NntpError::Temporary(resp) | NntpError::Permanent(resp)) => {
                    tracing::warn!(response = %resp, "CAPABILITIES not supported");
                    Capabilities::new()
                }
                Err(err) => return Err(err),
            };
            self.state.record_capabilities(caps);
            tracing::debug!(
                version = self.state.version(),
                implementation = self.state.implementation().unwrap_or(""),
                "capabilities refreshed"
            );
        }
        self.state
            .capabilities()
            .ok_or_else(|| NntpError::InvalidState("capabilities unavailable".into()))
    }

    async fn refresh_capabilities(&mut self) -> Result<(), NntpError> {
        self.state.invalidate_capabilities();
        self.capabilities().await?;
        Ok(())
    }

    async fn set_reader_mode(&mut self) -> Result<ReaderMode, NntpError> {
        let reply = self.short_command("MODE READER").await;
        let outcome = self.state.handle_reader_mode(reply)?;
        tracing::debug!(?outcome, "MODE READER");
        Ok(outcome)
    }

    /// Log in with `AUTHINFO USER`/`PASS`.
    ///
    /// With `use_store` set and no `user`, the session's credential store is
    /// asked for the host's entry; when none is found nothing is sent and the
    /// session stays anonymous.
    pub async fn login(
        &mut self,
        user: Option<&str>,
        password: Option<&str>,
        use_store: bool,
    ) -> Result<(), NntpError> {
        self.state.check_login()?;
        let mut user = user.filter(|u| !u.is_empty()).map(str::to_string);
        let mut password = password.map(str::to_string);
        if user.is_none() && !use_store {
            return Err(NntpError::InvalidArgument(
                "login needs a username or a credential store lookup".into(),
            ));
        }

        if user.is_none() {
            if let Some(creds) = self.lookup_credentials() {
                user = Some(creds.username);
                password = creds.password;
            }
        }
        let Some(user) = user else {
            tracing::debug!(host = %self.host, "no stored credentials, staying anonymous");
            return Ok(());
        };

        let resp = self.short_command(&format!("authinfo user {user}")).await?;
        if resp.code == 381 {
            let Some(password) = password else {
                return Err(NntpError::Reply(resp.text));
            };
            let resp = self.short_command(&format!("authinfo pass {password}")).await?;
            if resp.code != 281 {
                return Err(NntpError::Permanent(resp.text));
            }
        }
        self.state.mark_authenticated();
        tracing::debug!(user = %user, "authenticated");

        self.refresh_capabilities().await?;
        if self.state.reader_mode_deferred() && !self.state.has_capability("READER") {
            self.set_reader_mode().await?;
            self.refresh_capabilities().await?;
        }
        Ok(())
    }

    fn lookup_credentials(&self) -> Option<Credentials> {
        let store = self.credentials.as_ref()?;
        match store.lookup(&self.host) {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(host = %self.host, error = %err, "credential lookup failed");
                None
            }
        }
    }

    /// Upgrade the connection with STARTTLS.
    ///
    /// Refused locally once TLS is active or the client has logged in. No
    /// new greeting follows the handshake; capabilities are re-read instead.
    /// Without `config`, the platform roots are used.
    pub async fn starttls(&mut self, config: Option<Arc<ClientConfig>>) -> Result<(), NntpError> {
        self.state.check_starttls()?;
        let config = match config {
            Some(config) => config,
            None => build_tls_config(true)?,
        };

        let resp = self.short_command("STARTTLS").await?;
        if resp.code != 382 {
            return Err(NntpError::Reply(resp.text));
        }

        let detached = LineChannel::detached(self.timeout);
        let plain = std::mem::replace(&mut self.channel, detached).into_inner()?;
        let secure = tls_connect(plain, &self.host, config, self.timeout).await?;
        self.channel = LineChannel::new(secure, self.timeout);

        self.state.mark_tls_active();
        tracing::debug!(host = %self.host, "STARTTLS active");
        self.refresh_capabilities().await
    }

    /// Send `QUIT` and close the connection whatever the reply.
    pub async fn quit(mut self) -> Result<NntpResponse, NntpError> {
        let reply = self.short_command("QUIT").await;
        if let Err(err) = self.close().await {
            tracing::debug!(error = %err, "close after QUIT");
        }
        reply
    }

    /// Shut the stream down and release it. The transport is dropped even
    /// when the shutdown fails.
    pub async fn close(mut self) -> Result<(), NntpError> {
        self.channel.shutdown().await
    }
}

fn check_timeout(timeout: Option<Duration>) -> Result<(), NntpError> {
    if timeout == Some(Duration::ZERO) {
        return Err(NntpError::InvalidArgument(
            "a zero timeout is not supported".into(),
        ));
    }
    Ok(())
}
