//! One method per protocol verb ([RFC 3977](https://datatracker.ietf.org/doc/html/rfc3977),
//! plus the [RFC 2980](https://datatracker.ietf.org/doc/html/rfc2980) extensions
//! `XHDR`, `XOVER` and `XGTITLE`).

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;

use crate::datetime::{parse_datetime, unparse_datetime};
use crate::error::NntpError;
use crate::model::{
    ArticleInfo, ArticleRef, GroupInfo, GroupStatus, NntpResponse, OverviewEntry, OverviewRange,
    XhdrLine,
};
use crate::overview::{default_overview_fmt, parse_overview, parse_overview_fmt};
use crate::response::{split_lines, stuff_line};
use crate::session::NntpSession;
use crate::sink::{BodySink, LineBuffer};

static XHDR_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+) ?(.*)\n?").expect("valid regex"));

static DESCRIPTION_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^ \t]+)[ \t]+(.*)$").expect("valid regex"));

/// Which part of an article to retrieve.
#[derive(Debug, Clone, Copy)]
enum ArticlePart {
    Whole,
    Head,
    Body,
}

impl ArticlePart {
    fn verb(self) -> &'static str {
        match self {
            ArticlePart::Whole => "ARTICLE",
            ArticlePart::Head => "HEAD",
            ArticlePart::Body => "BODY",
        }
    }
}

impl NntpSession {
    /// Groups created since `since` ([RFC 3977 §7.3](https://datatracker.ietf.org/doc/html/rfc3977#section-7.3)).
    pub async fn newgroups(&mut self, since: NaiveDateTime) -> Result<Vec<GroupInfo>, NntpError> {
        let (date, time) = self.date_arguments(&since).await?;
        let (_, lines) = self
            .long_command_strings(&format!("NEWGROUPS {date} {time}"))
            .await?;
        parse_group_list(&lines)
    }

    /// Message-ids of articles posted to `group` (a wildmat) since `since`
    /// ([RFC 3977 §7.4](https://datatracker.ietf.org/doc/html/rfc3977#section-7.4)).
    pub async fn newnews(
        &mut self,
        group: &str,
        since: NaiveDateTime,
    ) -> Result<Vec<String>, NntpError> {
        let (date, time) = self.date_arguments(&since).await?;
        let (_, lines) = self
            .long_command_strings(&format!("NEWNEWS {group} {date} {time}"))
            .await?;
        Ok(lines)
    }

    async fn date_arguments(&mut self, since: &NaiveDateTime) -> Result<(String, String), NntpError> {
        self.capabilities().await?;
        Ok(unparse_datetime(since, self.version() < 2))
    }

    /// `LIST`, or `LIST ACTIVE <pattern>` when a pattern is given.
    pub async fn list(&mut self, pattern: Option<&str>) -> Result<Vec<GroupInfo>, NntpError> {
        let command = match pattern {
            Some(pattern) => format!("LIST ACTIVE {pattern}"),
            None => "LIST".to_string(),
        };
        let (_, lines) = self.long_command_strings(&command).await?;
        parse_group_list(&lines)
    }

    /// Description of a single group; the first match if `group` is a
    /// pattern, or an empty string if nothing matches.
    pub async fn description(&mut self, group: &str) -> Result<String, NntpError> {
        let (_, lines) = self.description_lines(group).await?;
        Ok(lines
            .iter()
            .find_map(|line| parse_description_line(line))
            .map(|(_, desc)| desc)
            .unwrap_or_default())
    }

    /// Descriptions of all groups matching `pattern`, keyed by group name.
    pub async fn descriptions(
        &mut self,
        pattern: &str,
    ) -> Result<BTreeMap<String, String>, NntpError> {
        let (_, lines) = self.description_lines(pattern).await?;
        Ok(lines
            .iter()
            .filter_map(|line| parse_description_line(line))
            .collect())
    }

    /// `LIST NEWSGROUPS`, falling back to the older `XGTITLE`.
    async fn description_lines(
        &mut self,
        pattern: &str,
    ) -> Result<(NntpResponse, Vec<String>), NntpError> {
        match self
            .long_command_strings(&format!("LIST NEWSGROUPS {pattern}"))
            .await
        {
            Ok((resp, lines)) if resp.code == 215 => Ok((resp, lines)),
            Ok(_) | Err(NntpError::Permanent(_)) => {
                self.long_command_strings(&format!("XGTITLE {pattern}"))
                    .await
            }
            Err(err) => Err(err),
        }
    }

    /// Select a group ([RFC 3977 §6.1.1](https://datatracker.ietf.org/doc/html/rfc3977#section-6.1.1)).
    ///
    /// Counters the server leaves out are reported as zero.
    pub async fn group(&mut self, name: &str) -> Result<GroupStatus, NntpError> {
        let resp = self.short_command(&format!("GROUP {name}")).await?;
        if resp.code != 211 {
            return Err(NntpError::Reply(resp.text));
        }
        let words: Vec<&str> = resp.text.split_whitespace().collect();
        let number = |i: usize| -> Result<u64, NntpError> {
            match words.get(i) {
                Some(word) => word
                    .parse()
                    .map_err(|_| NntpError::Data(resp.text.clone())),
                None => Ok(0),
            }
        };
        Ok(GroupStatus {
            count: number(1)?,
            first: number(2)?,
            last: number(3)?,
            name: words.get(4).map(|n| n.to_lowercase()),
        })
    }

    pub async fn help(&mut self) -> Result<Vec<String>, NntpError> {
        let (_, lines) = self.long_command_strings("HELP").await?;
        Ok(lines)
    }

    /// Check that an article exists and make it current
    /// ([RFC 3977 §6.2.4](https://datatracker.ietf.org/doc/html/rfc3977#section-6.2.4)).
    /// Returns its number and message-id.
    pub async fn stat(&mut self, article: Option<&ArticleRef>) -> Result<(u64, String), NntpError> {
        let resp = self.short_command(&with_article("STAT", article)).await?;
        parse_article_status(&resp)
    }

    pub async fn next(&mut self) -> Result<(u64, String), NntpError> {
        let resp = self.short_command("NEXT").await?;
        parse_article_status(&resp)
    }

    pub async fn last(&mut self) -> Result<(u64, String), NntpError> {
        let resp = self.short_command("LAST").await?;
        parse_article_status(&resp)
    }

    /// Fetch a whole article, headers and body, as lines without terminators.
    pub async fn article(&mut self, article: Option<&ArticleRef>) -> Result<ArticleInfo, NntpError> {
        self.fetch_buffered(ArticlePart::Whole, article).await
    }

    pub async fn head(&mut self, article: Option<&ArticleRef>) -> Result<ArticleInfo, NntpError> {
        self.fetch_buffered(ArticlePart::Head, article).await
    }

    pub async fn body(&mut self, article: Option<&ArticleRef>) -> Result<ArticleInfo, NntpError> {
        self.fetch_buffered(ArticlePart::Body, article).await
    }

    /// Like [`article`](Self::article), but stream each line, terminator
    /// included, into `sink`. The returned `lines` is empty.
    pub async fn article_into(
        &mut self,
        article: Option<&ArticleRef>,
        sink: &mut dyn BodySink,
    ) -> Result<ArticleInfo, NntpError> {
        self.fetch_into(ArticlePart::Whole, article, sink).await
    }

    pub async fn head_into(
        &mut self,
        article: Option<&ArticleRef>,
        sink: &mut dyn BodySink,
    ) -> Result<ArticleInfo, NntpError> {
        self.fetch_into(ArticlePart::Head, article, sink).await
    }

    pub async fn body_into(
        &mut self,
        article: Option<&ArticleRef>,
        sink: &mut dyn BodySink,
    ) -> Result<ArticleInfo, NntpError> {
        self.fetch_into(ArticlePart::Body, article, sink).await
    }

    async fn fetch_buffered(
        &mut self,
        part: ArticlePart,
        article: Option<&ArticleRef>,
    ) -> Result<ArticleInfo, NntpError> {
        let mut buffer = LineBuffer::new();
        let mut info = self.fetch_into(part, article, &mut buffer).await?;
        info.lines = buffer.into_lines();
        Ok(info)
    }

    async fn fetch_into(
        &mut self,
        part: ArticlePart,
        article: Option<&ArticleRef>,
        sink: &mut dyn BodySink,
    ) -> Result<ArticleInfo, NntpError> {
        let resp = self
            .long_command(&with_article(part.verb(), article), sink)
            .await?;
        let (number, message_id) = parse_article_status(&resp)?;
        Ok(ArticleInfo {
            number,
            message_id,
            lines: Vec::new(),
        })
    }

    /// `SLAVE` ([RFC 977 §3.12](https://datatracker.ietf.org/doc/html/rfc977#section-3.12)).
    pub async fn slave(&mut self) -> Result<NntpResponse, NntpError> {
        self.short_command("SLAVE").await
    }

    /// Values of `header` for the articles in `range`, which may be an
    /// article number, a message-id or `first-last`.
    pub async fn xhdr(&mut self, header: &str, range: &str) -> Result<Vec<XhdrLine>, NntpError> {
        let (_, lines) = self
            .long_command_strings(&format!("XHDR {header} {range}"))
            .await?;
        Ok(lines.into_iter().map(parse_xhdr_line).collect())
    }

    /// `XOVER start-end`, decoded against the server's overview format.
    pub async fn xover(&mut self, start: u64, end: u64) -> Result<Vec<OverviewEntry>, NntpError> {
        let (_, lines) = self
            .long_command_strings(&format!("XOVER {start}-{end}"))
            .await?;
        let fmt = self.overview_fmt().await?;
        parse_overview(&lines, &fmt)
    }

    /// Overview data for `range`, using `OVER` when advertised and `XOVER`
    /// otherwise. A message-id range only works with `OVER`.
    pub async fn over(&mut self, range: &OverviewRange) -> Result<Vec<OverviewEntry>, NntpError> {
        let verb = if self.capabilities().await?.contains_key("OVER") {
            "OVER"
        } else {
            "XOVER"
        };
        let command = match range.argument() {
            Some(arg) => format!("{verb} {arg}"),
            None => verb.to_string(),
        };
        let (_, lines) = self.long_command_strings(&command).await?;
        let fmt = self.overview_fmt().await?;
        parse_overview(&lines, &fmt)
    }

    /// The server's overview field list, fetched once per session. Servers
    /// that reject `LIST OVERVIEW.FMT` get the default list.
    pub async fn overview_fmt(&mut self) -> Result<Vec<String>, NntpError> {
        if let Some(fmt) = self.state().overview_fmt() {
            return Ok(fmt.to_vec());
        }
        let fmt = match self.long_command_strings("LIST OVERVIEW.FMT").await {
            Ok((_, lines)) => parse_overview_fmt(&lines)?,
            Err(NntpError::Permanent(resp)) => {
                tracing::debug!(response = %resp, "LIST OVERVIEW.FMT unsupported, using defaults");
                default_overview_fmt()
            }
            Err(err) => return Err(err),
        };
        self.state_mut().cache_overview_fmt(fmt.clone());
        Ok(fmt)
    }

    /// Server clock in UTC ([RFC 3977 §7.1](https://datatracker.ietf.org/doc/html/rfc3977#section-7.1)).
    pub async fn date(&mut self) -> Result<NaiveDateTime, NntpError> {
        let resp = self.short_command("DATE").await?;
        if resp.code != 111 {
            return Err(NntpError::Reply(resp.text));
        }
        let words: Vec<&str> = resp.text.split_whitespace().collect();
        match words.as_slice() {
            [_, stamp] if stamp.len() == 14 => parse_datetime(stamp, None),
            _ => Err(NntpError::Data(resp.text.clone())),
        }
    }

    /// Post an article given as lines ([RFC 3977 §6.3.1](https://datatracker.ietf.org/doc/html/rfc3977#section-6.3.1)).
    ///
    /// Lines may or may not carry their CRLF; leading dots are doubled.
    pub async fn post<I, L>(&mut self, lines: I) -> Result<NntpResponse, NntpError>
    where
        I: IntoIterator<Item = L>,
        L: AsRef<[u8]>,
    {
        self.send_article("POST", lines).await
    }

    /// Post an article given as one buffer; it is split on CRLF, LF or CR.
    pub async fn post_bytes(&mut self, data: &[u8]) -> Result<NntpResponse, NntpError> {
        self.send_article("POST", split_lines(data)).await
    }

    /// Offer an article by message-id ([RFC 3977 §6.3.2](https://datatracker.ietf.org/doc/html/rfc3977#section-6.3.2)).
    pub async fn ihave<I, L>(&mut self, message_id: &str, lines: I) -> Result<NntpResponse, NntpError>
    where
        I: IntoIterator<Item = L>,
        L: AsRef<[u8]>,
    {
        self.send_article(&format!("IHAVE {message_id}"), lines)
            .await
    }

    pub async fn ihave_bytes(&mut self, message_id: &str, data: &[u8]) -> Result<NntpResponse, NntpError> {
        self.send_article(&format!("IHAVE {message_id}"), split_lines(data))
            .await
    }

    async fn send_article<I, L>(&mut self, command: &str, lines: I) -> Result<NntpResponse, NntpError>
    where
        I: IntoIterator<Item = L>,
        L: AsRef<[u8]>,
    {
        let resp = self.short_command(command).await?;
        if !resp.text.starts_with('3') {
            return Err(NntpError::Reply(resp.text));
        }
        let mut block = Vec::new();
        for line in lines {
            block.extend_from_slice(&stuff_line(line.as_ref()));
        }
        block.extend_from_slice(b".\r\n");
        self.write_block(&block).await?;
        self.get_response().await
    }
}

fn with_article(verb: &str, article: Option<&ArticleRef>) -> String {
    match article {
        Some(article) => format!("{verb} {article}"),
        None => verb.to_string(),
    }
}

/// `22x <number> <message-id> ...`
fn parse_article_status(resp: &NntpResponse) -> Result<(u64, String), NntpError> {
    if !resp.text.starts_with("22") {
        return Err(NntpError::Reply(resp.text.clone()));
    }
    let mut words = resp.text.split_whitespace().skip(1);
    let number = words.next().and_then(|n| n.parse::<u64>().ok());
    let message_id = words.next();
    match (number, message_id) {
        (Some(number), Some(message_id)) => Ok((number, message_id.to_string())),
        _ => Err(NntpError::Data(resp.text.clone())),
    }
}

/// `group last first flag`, exactly four fields per line.
fn parse_group_list<S: AsRef<str>>(lines: &[S]) -> Result<Vec<GroupInfo>, NntpError> {
    lines
        .iter()
        .map(|line| {
            let line = line.as_ref();
            match line.split_whitespace().collect::<Vec<_>>().as_slice() {
                [group, last, first, flag] => Ok(GroupInfo {
                    group: group.to_string(),
                    last: last.to_string(),
                    first: first.to_string(),
                    flag: flag.to_string(),
                }),
                _ => Err(NntpError::Data(format!("invalid group line: {line}"))),
            }
        })
        .collect()
}

fn parse_description_line(line: &str) -> Option<(String, String)> {
    let caps = DESCRIPTION_LINE_RE.captures(line.trim())?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

fn parse_xhdr_line(line: String) -> XhdrLine {
    let parsed = XHDR_LINE_RE.captures(&line).and_then(|caps| {
        let number = caps[1].parse::<u64>().ok()?;
        Some(XhdrLine::Article {
            number,
            value: caps[2].to_string(),
        })
    });
    parsed.unwrap_or(XhdrLine::Unparsed(line))
}
