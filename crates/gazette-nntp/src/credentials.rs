use std::collections::HashMap;
use std::io;

/// Source of stored login credentials, keyed by server hostname.
///
/// Consulted by [`NntpSession::login`](crate::NntpSession::login) when no
/// username is given. Missing entries and lookup errors are not fatal.
pub trait CredentialStore: Send + Sync {
    fn lookup(&self, host: &str) -> io::Result<Option<Credentials>>;
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Fixed in-memory table, handy for configuration-driven setups and tests.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentials {
    entries: HashMap<String, Credentials>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        host: impl Into<String>,
        username: impl Into<String>,
        password: Option<&str>,
    ) -> Self {
        self.entries.insert(
            host.into().to_ascii_lowercase(),
            Credentials {
                username: username.into(),
                password: password.map(str::to_string),
            },
        );
        self
    }
}

impl CredentialStore for StaticCredentials {
    fn lookup(&self, host: &str) -> io::Result<Option<Credentials>> {
        Ok(self.entries.get(&host.to_ascii_lowercase()).cloned())
    }
}
