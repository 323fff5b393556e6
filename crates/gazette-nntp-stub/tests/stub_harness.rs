use std::net::SocketAddr;
use std::time::Duration;

use chrono::NaiveDate;
use gazette_nntp::{
    ArticleRef, BodySink, LineBuffer, NewsServer, NntpError, NntpSession, OverviewRange,
};
use gazette_nntp_stub::{
    FixtureConfig, StubConfig, StubServer, default_fixtures_path, load_fixtures,
};
use tokio::task::JoinHandle;

fn available_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn stub_config(port: u16) -> StubConfig {
    StubConfig {
        bind: SocketAddr::from(([127, 0, 0, 1], port)),
        require_auth: false,
        username: "test".to_string(),
        password: "secret".to_string(),
        disconnect_after: 0,
        delay_ms: 0,
    }
}

fn basic_fixtures() -> FixtureConfig {
    load_fixtures(&default_fixtures_path()).expect("fixtures")
}

fn news_server(port: u16) -> NewsServer {
    NewsServer {
        port,
        timeout_secs: Some(5),
        ..NewsServer::new("127.0.0.1")
    }
}

async fn start(server: StubServer) -> JoinHandle<()> {
    let task = tokio::spawn(async move {
        server.serve_once().await.expect("stub serve");
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    task
}

async fn finish(task: JoinHandle<()>) {
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("stub finished")
        .expect("stub task");
}

#[tokio::test]
async fn reads_group_and_article_over_tcp() {
    let port = available_port();
    let task = start(StubServer::new(stub_config(port), basic_fixtures())).await;

    let mut session = NntpSession::connect(&news_server(port)).await.unwrap();
    assert!(session.posting_allowed());
    assert_eq!(session.version(), 2);
    assert_eq!(session.implementation(), Some("gazette-nntp-stub"));

    let status = session.group("alt.test").await.unwrap();
    assert_eq!(status.count, 3);
    assert_eq!(status.first, 1);
    assert_eq!(status.last, 3);
    assert_eq!(status.name.as_deref(), Some("alt.test"));

    let body = session.body(Some(&ArticleRef::Number(1))).await.unwrap();
    assert_eq!(body.number, 1);
    assert_eq!(body.message_id, "<first-1@test>");
    assert_eq!(
        body.lines,
        vec![
            b"First line".to_vec(),
            b".leading dot".to_vec(),
            b"Last line".to_vec()
        ]
    );

    assert_eq!(session.next().await.unwrap(), (2, "<second-2@test>".to_string()));
    let head = session.head(None).await.unwrap();
    assert!(
        head.lines
            .iter()
            .any(|l| l.as_slice() == b"References: <first-1@test>")
    );

    let resp = session.quit().await.unwrap();
    assert_eq!(resp.code, 205);
    finish(task).await;
}

#[tokio::test]
async fn streams_article_into_sink_by_message_id() {
    let port = available_port();
    let task = start(StubServer::new(stub_config(port), basic_fixtures())).await;

    let mut session = NntpSession::connect(&news_server(port)).await.unwrap();
    let mut sink = LineBuffer::new();
    let info = session
        .article_into(Some(&ArticleRef::message_id("second-2@test")), &mut sink)
        .await
        .unwrap();
    assert_eq!(info.number, 0);
    assert!(info.lines.is_empty());

    let lines = sink.into_strings();
    assert!(lines.contains(&"Subject: Re: Hello world".to_string()));
    assert!(lines.contains(&String::new()));
    assert_eq!(lines.last().map(String::as_str), Some("Reply body"));

    session.quit().await.unwrap();
    finish(task).await;
}

#[tokio::test]
async fn missing_article_is_a_temporary_error() {
    let port = available_port();
    let task = start(StubServer::new(stub_config(port), basic_fixtures())).await;

    let mut session = NntpSession::connect(&news_server(port)).await.unwrap();
    let err = session
        .body(Some(&ArticleRef::message_id("missing-1@test")))
        .await
        .unwrap_err();
    assert!(matches!(err, NntpError::Temporary(ref text) if text.starts_with("430")));
    assert!(!err.is_fatal());

    // The session survives a refused command.
    session.group("alt.test").await.unwrap();
    let err = session.stat(Some(&ArticleRef::Number(99))).await.unwrap_err();
    assert!(matches!(err, NntpError::Temporary(ref text) if text.starts_with("423")));

    session.quit().await.unwrap();
    finish(task).await;
}

#[tokio::test]
async fn lists_groups_and_descriptions() {
    let port = available_port();
    let task = start(StubServer::new(stub_config(port), basic_fixtures())).await;

    let mut session = NntpSession::connect(&news_server(port)).await.unwrap();
    let groups = session.list(None).await.unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].group, "alt.test");
    assert_eq!(groups[0].last, "3");
    assert_eq!(groups[0].first, "1");
    assert!(groups[0].posting_allowed());
    assert!(!groups[1].posting_allowed());

    let rust_only = session.list(Some("comp.*")).await.unwrap();
    assert_eq!(rust_only.len(), 1);
    assert_eq!(rust_only[0].group, "comp.lang.rust");

    assert_eq!(
        session.description("alt.test").await.unwrap(),
        "Testing, one two three"
    );
    let all = session.descriptions("*").await.unwrap();
    assert_eq!(
        all.get("comp.lang.rust").map(String::as_str),
        Some("The Rust programming language")
    );
    assert!(session.description("no.such.group").await.unwrap().is_empty());

    session.quit().await.unwrap();
    finish(task).await;
}

#[tokio::test]
async fn overview_uses_server_format() {
    let port = available_port();
    let task = start(StubServer::new(stub_config(port), basic_fixtures())).await;

    let mut session = NntpSession::connect(&news_server(port)).await.unwrap();
    session.group("alt.test").await.unwrap();

    let fmt = session.overview_fmt().await.unwrap();
    assert_eq!(fmt[0], "subject");
    assert_eq!(fmt[6], ":lines");

    let rows = session
        .over(&OverviewRange::Range {
            start: 1,
            end: Some(2),
        })
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].number, 1);
    assert_eq!(rows[0].get("subject"), Some("Hello world"));
    assert_eq!(rows[0].get("references"), Some(""));
    assert_eq!(rows[0].get(":lines"), Some("3"));
    assert_eq!(rows[1].get("references"), Some("<first-1@test>"));

    let legacy = session.xover(2, 3).await.unwrap();
    assert_eq!(legacy.len(), 2);
    assert_eq!(legacy[1].get("message-id"), Some("<missing-1@test>"));

    session.quit().await.unwrap();
    finish(task).await;
}

#[tokio::test]
async fn posts_article_with_dot_stuffing() {
    let port = available_port();
    let server = StubServer::new(stub_config(port), basic_fixtures());
    let recorder = server.clone();
    let task = start(server).await;

    let mut session = NntpSession::connect(&news_server(port)).await.unwrap();
    let resp = session
        .post([
            "From: alice@example.com",
            "Newsgroups: alt.test",
            "Subject: dots",
            "",
            ".starts with a dot",
            "plain",
        ])
        .await
        .unwrap();
    assert_eq!(resp.code, 240);
    session.quit().await.unwrap();
    finish(task).await;

    let posted = recorder.posted().await;
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0][4], ".starts with a dot");
    assert_eq!(posted[0].len(), 6);
}

#[tokio::test]
async fn posting_refused_when_disabled() {
    let port = available_port();
    let mut fixtures = basic_fixtures();
    fixtures.allow_posting = false;
    let task = start(StubServer::new(stub_config(port), fixtures)).await;

    let mut session = NntpSession::connect(&news_server(port)).await.unwrap();
    let err = session.post_bytes(b"Subject: x\r\n\r\nbody\r\n").await.unwrap_err();
    assert!(matches!(err, NntpError::Temporary(ref text) if text.starts_with("440")));

    session.quit().await.unwrap();
    finish(task).await;
}

#[tokio::test]
async fn date_is_parsed() {
    let port = available_port();
    let task = start(StubServer::new(stub_config(port), basic_fixtures())).await;

    let mut session = NntpSession::connect(&news_server(port)).await.unwrap();
    let date = session.date().await.unwrap();
    let expected = NaiveDate::from_ymd_opt(2024, 3, 15)
        .unwrap()
        .and_hms_opt(12, 30, 45)
        .unwrap();
    assert_eq!(date, expected);

    let help = session.help().await.unwrap();
    assert!(help[0].starts_with("Supported commands"));

    session.quit().await.unwrap();
    finish(task).await;
}

#[tokio::test]
async fn logs_in_when_credentials_configured() {
    let port = available_port();
    let mut config = stub_config(port);
    config.require_auth = true;
    let task = start(StubServer::new(config, basic_fixtures())).await;

    let server = NewsServer {
        username: Some("test".to_string()),
        password: Some("secret".to_string()),
        ..news_server(port)
    };
    let mut session = NntpSession::connect(&server).await.unwrap();
    assert!(session.authenticated());
    session.group("alt.test").await.unwrap();

    session.quit().await.unwrap();
    finish(task).await;
}

#[tokio::test]
async fn rejected_password_fails_connect() {
    let port = available_port();
    let mut config = stub_config(port);
    config.require_auth = true;
    let task = start(StubServer::new(config, basic_fixtures())).await;

    let server = NewsServer {
        username: Some("test".to_string()),
        password: Some("wrong".to_string()),
        ..news_server(port)
    };
    let err = NntpSession::connect(&server).await.err().unwrap();
    assert!(matches!(err, NntpError::Temporary(ref text) if text.starts_with("481")));
    finish(task).await;
}

#[tokio::test]
async fn anonymous_client_is_asked_to_authenticate() {
    let port = available_port();
    let mut config = stub_config(port);
    config.require_auth = true;
    let task = start(StubServer::new(config, basic_fixtures())).await;

    let mut session = NntpSession::connect(&news_server(port)).await.unwrap();
    assert!(!session.authenticated());
    let err = session.group("alt.test").await.unwrap_err();
    assert!(matches!(err, NntpError::Temporary(ref text) if text.starts_with("480")));

    session.login(Some("test"), Some("secret"), false).await.unwrap();
    session.group("alt.test").await.unwrap();

    session.quit().await.unwrap();
    finish(task).await;
}

#[tokio::test]
async fn reader_mode_retried_after_login() {
    let port = available_port();
    let mut config = stub_config(port);
    config.require_auth = true;
    let mut fixtures = basic_fixtures();
    fixtures.capabilities = Some(vec![
        "VERSION 2".to_string(),
        "MODE-READER".to_string(),
        "AUTHINFO USER".to_string(),
    ]);
    fixtures.reader_mode_requires_auth = true;
    let task = start(StubServer::new(config, fixtures)).await;

    let server = NewsServer {
        username: Some("test".to_string()),
        password: Some("secret".to_string()),
        reader_mode: true,
        ..news_server(port)
    };
    let mut session = NntpSession::connect(&server).await.unwrap();
    assert!(session.authenticated());
    assert!(session.welcome().contains("reader mode"));

    session.quit().await.unwrap();
    finish(task).await;
}

#[tokio::test]
async fn dropped_connection_is_fatal() {
    let port = available_port();
    let mut config = stub_config(port);
    config.disconnect_after = 2;
    let task = start(StubServer::new(config, basic_fixtures())).await;

    // CAPABILITIES is the first command; the second one is dropped.
    let mut session = NntpSession::connect(&news_server(port)).await.unwrap();
    let err = session.group("alt.test").await.unwrap_err();
    assert!(err.is_fatal());
    drop(session);
    finish(task).await;
}

#[tokio::test]
async fn custom_sink_receives_unstuffed_lines() {
    struct Counter(usize, Vec<u8>);

    #[async_trait::async_trait]
    impl BodySink for Counter {
        async fn append(&mut self, line: &[u8]) -> Result<(), NntpError> {
            self.0 += 1;
            self.1.extend_from_slice(line);
            Ok(())
        }
    }

    let port = available_port();
    let task = start(StubServer::new(stub_config(port), basic_fixtures())).await;

    let mut session = NntpSession::connect(&news_server(port)).await.unwrap();
    session.group("alt.test").await.unwrap();
    let mut counter = Counter(0, Vec::new());
    session.body_into(None, &mut counter).await.unwrap();
    assert_eq!(counter.0, 3);
    assert_eq!(counter.1, b"First line\r\n.leading dot\r\nLast line\r\n".to_vec());

    session.quit().await.unwrap();
    finish(task).await;
}
