use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

pub type StubError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Deserialize, Clone)]
pub struct FixtureConfig {
    pub greeting: Option<String>,
    /// Lines of the `CAPABILITIES` reply; a built-in reader list when absent.
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,
    /// `LIST OVERVIEW.FMT` lines; the command is refused with `503` when absent.
    #[serde(default)]
    pub overview_fmt: Option<Vec<String>>,
    /// Answer `MODE READER` with `480` until the client has logged in.
    #[serde(default)]
    pub reader_mode_requires_auth: bool,
    #[serde(default = "default_true")]
    pub allow_posting: bool,
    /// `DATE` reply value, `YYYYMMDDhhmmss`.
    #[serde(default)]
    pub date: Option<String>,
    pub groups: BTreeMap<String, GroupConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GroupConfig {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub posting: bool,
    pub articles: Vec<ArticleFixture>,
    #[serde(default)]
    pub missing_articles: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArticleFixture {
    pub number: u64,
    /// Without angle brackets.
    pub message_id: String,
    pub subject: String,
    pub from: String,
    pub date: String,
    #[serde(default)]
    pub references: String,
    pub body: String,
}

impl ArticleFixture {
    fn header_lines(&self, group: &str) -> Vec<String> {
        let mut lines = vec![
            "Path: stub!not-for-mail".to_string(),
            format!("From: {}", self.from),
            format!("Newsgroups: {group}"),
            format!("Subject: {}", self.subject),
            format!("Date: {}", self.date),
            format!("Message-ID: <{}>", self.message_id),
        ];
        if !self.references.is_empty() {
            lines.push(format!("References: {}", self.references));
        }
        lines
    }

    fn body_lines(&self) -> Vec<String> {
        self.body.split('\n').map(|l| l.replace('\r', "")).collect()
    }

    fn overview_row(&self) -> String {
        let body = self.body_lines();
        let bytes: usize = body.iter().map(|l| l.len() + 2).sum();
        format!(
            "{}\t{}\t{}\t{}\t<{}>\t{}\t{}\t{}",
            self.number,
            self.subject,
            self.from,
            self.date,
            self.message_id,
            self.references,
            bytes,
            body.len()
        )
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct StubConfig {
    pub bind: SocketAddr,
    pub require_auth: bool,
    pub username: String,
    pub password: String,
    pub disconnect_after: usize,
    pub delay_ms: u64,
}

#[derive(Debug)]
struct ClientSession {
    authenticated: bool,
    current_group: Option<String>,
    current_article: Option<u64>,
    commands_seen: usize,
}

#[derive(Clone)]
pub struct StubServer {
    state: Arc<ServerState>,
}

impl StubServer {
    pub fn new(config: StubConfig, fixtures: FixtureConfig) -> Self {
        Self {
            state: Arc::new(ServerState::new(config, fixtures)),
        }
    }

    pub async fn serve(self) -> Result<(), StubError> {
        let listener = TcpListener::bind(self.state.config.bind).await?;
        loop {
            let (stream, peer) = listener.accept().await?;
            tracing::info!(%peer, "client connected");
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                if let Err(err) = handle_client(stream, state).await {
                    tracing::warn!(%peer, error = %err, "client error");
                }
            });
        }
    }

    pub async fn serve_once(self) -> Result<(), StubError> {
        let listener = TcpListener::bind(self.state.config.bind).await?;
        let (stream, peer) = listener.accept().await?;
        tracing::info!(%peer, "client connected");
        handle_client(stream, Arc::clone(&self.state)).await?;
        Ok(())
    }

    /// Articles received through `POST`, unstuffed, one entry per article.
    pub async fn posted(&self) -> Vec<Vec<String>> {
        self.state.posted.lock().await.clone()
    }
}

struct ServerState {
    config: StubConfig,
    fixtures: FixtureConfig,
    posted: Mutex<Vec<Vec<String>>>,
}

impl ServerState {
    fn new(config: StubConfig, fixtures: FixtureConfig) -> Self {
        Self {
            config,
            fixtures,
            posted: Mutex::new(Vec::new()),
        }
    }
}

pub fn load_fixtures(path: &Path) -> Result<FixtureConfig, StubError> {
    let data = std::fs::read_to_string(path)?;
    let fixtures = serde_json::from_str(&data)?;
    Ok(fixtures)
}

/// `fixtures/nntp/fixtures-basic.json` at the workspace root.
pub fn default_fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("fixtures")
        .join("nntp")
        .join("fixtures-basic.json")
}

/// A status line, optionally followed by a dot-terminated block.
#[derive(Debug, PartialEq, Eq)]
struct Reply {
    status: String,
    block: Option<Vec<String>>,
}

impl Reply {
    fn status(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            block: None,
        }
    }

    fn block(status: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            status: status.into(),
            block: Some(lines),
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = format!("{}\r\n", self.status).into_bytes();
        if let Some(lines) = &self.block {
            for line in lines {
                if line.starts_with('.') {
                    out.push(b'.');
                }
                out.extend_from_slice(line.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            out.extend_from_slice(b".\r\n");
        }
        out
    }
}

async fn handle_client(stream: TcpStream, state: Arc<ServerState>) -> Result<(), StubError> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let greeting = state
        .fixtures
        .greeting
        .clone()
        .unwrap_or_else(|| "200 gazette test server ready".to_string());
    writer
        .write_all(format!("{greeting}\r\n").as_bytes())
        .await?;

    let mut session = ClientSession {
        authenticated: !state.config.require_auth,
        current_group: None,
        current_article: None,
        commands_seen: 0,
    };

    loop {
        let mut line = String::new();
        let bytes = reader.read_line(&mut line).await?;
        if bytes == 0 {
            break;
        }

        let command_line = line.trim();
        if command_line.is_empty() {
            continue;
        }

        session.commands_seen += 1;
        maybe_delay(&state.config).await;
        if should_disconnect(&state.config, &session) {
            tracing::info!(commands = session.commands_seen, "dropping client");
            return Ok(());
        }

        let mut parts = command_line.split_whitespace();
        let command = parts.next().unwrap_or("").to_uppercase();
        let args: Vec<&str> = parts.collect();
        if command == "AUTHINFO" && args.first().is_some_and(|a| a.eq_ignore_ascii_case("pass")) {
            tracing::debug!("<< AUTHINFO PASS ****");
        } else {
            tracing::debug!(command = command_line, "<<");
        }

        match command.as_str() {
            "QUIT" => {
                writer.write_all(b"205 closing connection\r\n").await?;
                break;
            }
            "POST" => handle_post(&state, &session, &mut reader, &mut writer).await?,
            _ => {
                let reply = respond(&command, &args, &state, &mut session);
                writer.write_all(&reply.encode()).await?;
            }
        }
    }

    Ok(())
}

fn respond(
    command: &str,
    args: &[&str],
    state: &ServerState,
    session: &mut ClientSession,
) -> Reply {
    match command {
        "CAPABILITIES" => capabilities(state),
        "AUTHINFO" => authinfo(args, state, session),
        "MODE" if args.first().is_some_and(|a| a.eq_ignore_ascii_case("reader")) => {
            if state.fixtures.reader_mode_requires_auth && !session.authenticated {
                Reply::status("480 authentication required")
            } else if state.fixtures.allow_posting {
                Reply::status("200 reader mode, posting allowed")
            } else {
                Reply::status("201 reader mode, no posting")
            }
        }
        "HELP" => Reply::block(
            "100 help text follows",
            vec![
                "Supported commands: ARTICLE AUTHINFO BODY CAPABILITIES DATE GROUP HEAD HELP".into(),
                "  LAST LIST MODE NEXT OVER POST QUIT STAT XOVER".into(),
            ],
        ),
        "DATE" => Reply::status(format!(
            "111 {}",
            state.fixtures.date.as_deref().unwrap_or("20240101000000")
        )),
        _ if !session.authenticated => Reply::status("480 authentication required"),
        "GROUP" => group(args.first().copied().unwrap_or(""), state, session),
        "LIST" => list(args, state),
        "OVER" | "XOVER" => overview(args.first().copied(), state, session),
        "ARTICLE" | "HEAD" | "BODY" | "STAT" => {
            article(command, args.first().copied(), state, session)
        }
        "NEXT" => step(state, session, true),
        "LAST" => step(state, session, false),
        _ => Reply::status("500 command not recognized"),
    }
}

fn capabilities(state: &ServerState) -> Reply {
    let lines = state.fixtures.capabilities.clone().unwrap_or_else(|| {
        [
            "VERSION 2",
            "READER",
            "OVER",
            "POST",
            "LIST ACTIVE NEWSGROUPS OVERVIEW.FMT",
            "AUTHINFO USER",
            "IMPLEMENTATION gazette-nntp-stub",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    });
    Reply::block("101 capability list follows", lines)
}

fn authinfo(args: &[&str], state: &ServerState, session: &mut ClientSession) -> Reply {
    let [verb, value] = args else {
        return Reply::status("501 syntax error");
    };
    match verb.to_uppercase().as_str() {
        "USER" if *value == state.config.username => Reply::status("381 password required"),
        "PASS" if *value == state.config.password => {
            session.authenticated = true;
            Reply::status("281 authentication accepted")
        }
        "USER" | "PASS" => Reply::status("481 authentication rejected"),
        _ => Reply::status("501 syntax error"),
    }
}

fn group(name: &str, state: &ServerState, session: &mut ClientSession) -> Reply {
    let Some(config) = state.fixtures.groups.get(name) else {
        return Reply::status("411 no such group");
    };
    let first = config.articles.iter().map(|a| a.number).min();
    let last = config.articles.iter().map(|a| a.number).max();
    session.current_group = Some(name.to_string());
    session.current_article = first;
    Reply::status(format!(
        "211 {} {} {} {name}",
        config.articles.len(),
        first.unwrap_or(0),
        last.unwrap_or(0)
    ))
}

fn list(args: &[&str], state: &ServerState) -> Reply {
    let keyword = args.first().map(|k| k.to_uppercase());
    let pattern = args.get(1).copied().unwrap_or("*");
    let matching: Vec<(&String, &GroupConfig)> = state
        .fixtures
        .groups
        .iter()
        .filter(|(name, _)| wildmat(pattern, name))
        .collect();
    match keyword.as_deref() {
        None | Some("ACTIVE") => {
            let lines = matching
                .iter()
                .map(|(name, config)| {
                    let last = config.articles.iter().map(|a| a.number).max().unwrap_or(0);
                    let first = config.articles.iter().map(|a| a.number).min().unwrap_or(0);
                    let flag = if config.posting { "y" } else { "n" };
                    format!("{name} {last} {first} {flag}")
                })
                .collect();
            Reply::block("215 list of newsgroups follows", lines)
        }
        Some("NEWSGROUPS") => {
            let lines = matching
                .iter()
                .filter_map(|(name, config)| {
                    config.description.as_ref().map(|d| format!("{name}\t{d}"))
                })
                .collect();
            Reply::block("215 descriptions follow", lines)
        }
        Some("OVERVIEW.FMT") => match &state.fixtures.overview_fmt {
            Some(fmt) => Reply::block("215 order of fields in overview database", fmt.clone()),
            None => Reply::status("503 overview format not available"),
        },
        Some(_) => Reply::status("501 unknown LIST keyword"),
    }
}

fn current_group<'a>(
    state: &'a ServerState,
    session: &ClientSession,
) -> Result<(&'a str, &'a GroupConfig), Reply> {
    let name = session
        .current_group
        .as_deref()
        .ok_or_else(|| Reply::status("412 no newsgroup selected"))?;
    state
        .fixtures
        .groups
        .get_key_value(name)
        .map(|(name, config)| (name.as_str(), config))
        .ok_or_else(|| Reply::status("411 no such group"))
}

fn overview(arg: Option<&str>, state: &ServerState, session: &ClientSession) -> Reply {
    if let Some(id) = arg.filter(|a| a.starts_with('<')) {
        return match find_by_message_id(state, id) {
            Some((_, article)) => Reply::block("224 overview follows", vec![article.overview_row()]),
            None => Reply::status("430 no such article"),
        };
    }
    let (_, config) = match current_group(state, session) {
        Ok(found) => found,
        Err(reply) => return reply,
    };
    let (start, end) = match arg {
        None => match session.current_article {
            Some(n) => (n, n),
            None => return Reply::status("420 no current article"),
        },
        Some(range) => match parse_range(range) {
            Some(bounds) => bounds,
            None => return Reply::status("501 invalid range"),
        },
    };
    let rows: Vec<String> = config
        .articles
        .iter()
        .filter(|a| a.number >= start && a.number <= end)
        .map(ArticleFixture::overview_row)
        .collect();
    if rows.is_empty() {
        return Reply::status("423 no articles in that range");
    }
    Reply::block("224 overview follows", rows)
}

fn parse_range(range: &str) -> Option<(u64, u64)> {
    match range.split_once('-') {
        Some((start, "")) => Some((start.parse().ok()?, u64::MAX)),
        Some((start, end)) => Some((start.parse().ok()?, end.parse().ok()?)),
        None => {
            let n = range.parse().ok()?;
            Some((n, n))
        }
    }
}

fn find_by_message_id<'a>(state: &'a ServerState, id: &str) -> Option<(&'a str, &'a ArticleFixture)> {
    let id = id.trim_matches(['<', '>']);
    state.fixtures.groups.iter().find_map(|(name, config)| {
        if config.missing_articles.iter().any(|m| m == id) {
            return None;
        }
        config
            .articles
            .iter()
            .find(|a| a.message_id == id)
            .map(|a| (name.as_str(), a))
    })
}

fn article(
    command: &str,
    arg: Option<&str>,
    state: &ServerState,
    session: &mut ClientSession,
) -> Reply {
    let (group, found, number) = match arg {
        Some(id) if id.starts_with('<') => match find_by_message_id(state, id) {
            Some((group, article)) => (group, article, 0),
            None => return Reply::status("430 no such article"),
        },
        _ => {
            let (group, config) = match current_group(state, session) {
                Ok(found) => found,
                Err(reply) => return reply,
            };
            let number = match arg {
                Some(n) => match n.parse::<u64>() {
                    Ok(n) => n,
                    Err(_) => return Reply::status("501 invalid article number"),
                },
                None => match session.current_article {
                    Some(n) => n,
                    None => return Reply::status("420 no current article"),
                },
            };
            let Some(article) = config.articles.iter().find(|a| a.number == number) else {
                return Reply::status("423 no article with that number");
            };
            if config.missing_articles.contains(&article.message_id) {
                return Reply::status("423 no article with that number");
            }
            session.current_article = Some(number);
            (group, article, number)
        }
    };

    let id = &found.message_id;
    match command {
        "ARTICLE" => {
            let mut lines = found.header_lines(group);
            lines.push(String::new());
            lines.extend(found.body_lines());
            Reply::block(format!("220 {number} <{id}> article follows"), lines)
        }
        "HEAD" => Reply::block(
            format!("221 {number} <{id}> headers follow"),
            found.header_lines(group),
        ),
        "BODY" => Reply::block(format!("222 {number} <{id}> body follows"), found.body_lines()),
        _ => Reply::status(format!("223 {number} <{id}> article exists")),
    }
}

fn step(state: &ServerState, session: &mut ClientSession, forward: bool) -> Reply {
    let (_, config) = match current_group(state, session) {
        Ok(found) => found,
        Err(reply) => return reply,
    };
    let Some(current) = session.current_article else {
        return Reply::status("420 no current article");
    };
    let target = if forward {
        config
            .articles
            .iter()
            .filter(|a| a.number > current)
            .min_by_key(|a| a.number)
    } else {
        config
            .articles
            .iter()
            .filter(|a| a.number < current)
            .max_by_key(|a| a.number)
    };
    match target {
        Some(article) => {
            session.current_article = Some(article.number);
            Reply::status(format!("223 {} <{}> article selected", article.number, article.message_id))
        }
        None if forward => Reply::status("421 no next article"),
        None => Reply::status("422 no previous article"),
    }
}

async fn handle_post(
    state: &ServerState,
    session: &ClientSession,
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
) -> Result<(), StubError> {
    if !session.authenticated {
        writer.write_all(b"480 authentication required\r\n").await?;
        return Ok(());
    }
    if !state.fixtures.allow_posting {
        writer.write_all(b"440 posting not permitted\r\n").await?;
        return Ok(());
    }
    writer.write_all(b"340 send article\r\n").await?;

    let mut article = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err("connection closed during POST".into());
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line == "." {
            break;
        }
        article.push(line.strip_prefix('.').unwrap_or(line).to_string());
    }
    tracing::info!(lines = article.len(), "article posted");
    state.posted.lock().await.push(article);
    writer.write_all(b"240 article received\r\n").await?;
    Ok(())
}

/// Minimal wildmat: `*` matches any run of characters, `?` any single one.
fn wildmat(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

async fn maybe_delay(config: &StubConfig) {
    if config.delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(config.delay_ms)).await;
    }
}

fn should_disconnect(config: &StubConfig, session: &ClientSession) -> bool {
    config.disconnect_after > 0 && session.commands_seen >= config.disconnect_after
}
