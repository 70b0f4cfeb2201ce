//! NNTP (RFC 5536 / MIME) representation of articles.
//!
//! Encoding produces the text sent after a `POST` command. Decoding reads
//! threading headers straight from the header block and leaves MIME work
//! (encoded subjects, multipart bodies, attachments) to `mail_parser`.

use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use mail_parser::{MessageParser, MimeHeaders};
use rand::Rng;

use super::{Article, Attachment, MessageId, DEFAULT_AUTHOR};
use crate::error::{Error, Result};

const BASE64_LINE: usize = 76;

impl Article {
    /// Render the article for injection.
    ///
    /// The injecting instance named in `From` and `Path` is the domain of the
    /// Message-ID. The body is CRLF-normalized. Dot-stuffing is the
    /// transport's job.
    pub fn to_wire(&self) -> String {
        let instance = self.message_id.domain();
        let mut out = String::new();
        push_header(
            &mut out,
            "From",
            &format!("{} <poster@{instance}>", encode_word(&self.author)),
        );
        push_header(&mut out, "Newsgroups", &self.newsgroup);
        push_header(
            &mut out,
            "Subject",
            &encode_word(self.subject.as_deref().unwrap_or("None")),
        );
        push_header(&mut out, "Message-ID", &self.message_id.to_wire());
        push_header(&mut out, "Date", &self.date.to_rfc2822());
        if !self.references.is_empty() {
            let references: Vec<String> = self.references.iter().map(MessageId::to_wire).collect();
            push_header(&mut out, "References", &references.join(" "));
        }
        push_header(&mut out, "Path", instance);
        push_header(&mut out, "MIME-Version", "1.0");

        let body = crlf(&self.body);
        match &self.attachment {
            None => {
                push_header(&mut out, "Content-Type", "text/plain; charset=UTF-8");
                push_header(&mut out, "Content-Transfer-Encoding", "8bit");
                out.push_str("\r\n");
                out.push_str(&body);
            }
            Some(attachment) => {
                let entropy: [u8; 12] = rand::thread_rng().gen();
                let boundary: String = entropy.iter().map(|b| format!("{b:02x}")).collect();
                let boundary = format!("=_nntpchan_{boundary}");
                push_header(
                    &mut out,
                    "Content-Type",
                    &format!("multipart/mixed; boundary=\"{boundary}\""),
                );
                out.push_str("\r\n");

                out.push_str(&format!("--{boundary}\r\n"));
                out.push_str("Content-Type: text/plain; charset=UTF-8\r\n");
                out.push_str("Content-Transfer-Encoding: 8bit\r\n\r\n");
                out.push_str(&body);

                out.push_str(&format!("--{boundary}\r\n"));
                out.push_str(&format!("Content-Type: {}\r\n", attachment.content_type));
                let filename = attachment
                    .filename
                    .as_deref()
                    .map(|name| name.replace(['"', '\\', '\r', '\n'], "_"))
                    .unwrap_or_else(|| "attachment".to_string());
                out.push_str(&format!(
                    "Content-Disposition: attachment; filename=\"{filename}\"\r\n"
                ));
                out.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
                let encoded = base64::engine::general_purpose::STANDARD.encode(&attachment.data);
                for line in encoded.as_bytes().chunks(BASE64_LINE) {
                    out.push_str(&String::from_utf8_lossy(line));
                    out.push_str("\r\n");
                }
                out.push_str(&format!("--{boundary}--\r\n"));
            }
        }
        out
    }

    /// Decode an article as returned by the `ARTICLE` command.
    ///
    /// Message-ID, Newsgroups and Date are required; anything else falls
    /// back to an empty or default value.
    pub fn from_wire(raw: &[u8]) -> Result<Article> {
        let headers = parse_header_block(raw)
            .ok_or_else(|| Error::MalformedArticle("missing header block".to_string()))?;

        let message_id = header(&headers, "Message-ID")
            .map(MessageId::new)
            .filter(|id| !id.as_str().is_empty())
            .ok_or_else(|| Error::MalformedArticle("missing Message-ID".to_string()))?;

        let newsgroup = header(&headers, "Newsgroups")
            .and_then(|groups| groups.split(',').map(str::trim).find(|g| !g.is_empty()))
            .map(str::to_string)
            .ok_or_else(|| {
                Error::MalformedArticle(format!("{message_id} has no Newsgroups header"))
            })?;

        let date = header(&headers, "Date")
            .and_then(parse_date)
            .ok_or_else(|| Error::MalformedArticle(format!("{message_id} has no usable Date")))?;

        let mut references = parse_references(header(&headers, "References"));
        if references.is_empty() {
            references = parse_references(header(&headers, "In-Reply-To"));
        }

        let message = MessageParser::default().parse(raw);
        let subject = message
            .as_ref()
            .and_then(|m| m.subject())
            .map(str::to_string)
            .filter(|s| !s.trim().is_empty());
        let author = message
            .as_ref()
            .and_then(|m| m.from())
            .and_then(|from| from.first())
            .and_then(|addr| addr.name())
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_AUTHOR.to_string());
        let body = message
            .as_ref()
            .and_then(|m| m.body_text(0))
            .map(|text| text.replace("\r\n", "\n"))
            .unwrap_or_default();
        let attachment = message.as_ref().and_then(|m| {
            m.attachments().next().map(|part| Attachment {
                filename: part.attachment_name().map(str::to_string),
                content_type: part
                    .content_type()
                    .map(|ct| match ct.subtype() {
                        Some(subtype) => format!("{}/{}", ct.ctype(), subtype),
                        None => ct.ctype().to_string(),
                    })
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                data: Bytes::copy_from_slice(part.contents()),
            })
        });

        Ok(Article {
            message_id,
            newsgroup,
            subject,
            author,
            references,
            date,
            body: body.trim_end_matches('\n').to_string(),
            attachment,
        })
    }
}

/// Split the header block into unfolded `(name, value)` pairs.
///
/// Returns `None` when no blank line separates headers from the body.
pub(crate) fn parse_header_block(raw: &[u8]) -> Option<Vec<(String, String)>> {
    let end = find_subslice(raw, b"\r\n\r\n").or_else(|| find_subslice(raw, b"\n\n"))?;
    let block = String::from_utf8_lossy(&raw[..end]);

    let mut headers: Vec<(String, String)> = Vec::new();
    for line in block.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }
    Some(headers)
}

/// Every group named in the Newsgroups header, in order.
pub(crate) fn newsgroups(raw: &[u8]) -> Vec<String> {
    parse_header_block(raw)
        .and_then(|headers| {
            header(&headers, "Newsgroups").map(|groups| {
                groups
                    .split(',')
                    .map(str::trim)
                    .filter(|g| !g.is_empty())
                    .map(str::to_string)
                    .collect()
            })
        })
        .unwrap_or_default()
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Parse a References-style header into ids, oldest first.
fn parse_references(references: Option<&str>) -> Vec<MessageId> {
    references
        .map(|refs| {
            refs.split_whitespace()
                .filter(|s| s.starts_with('<') && s.ends_with('>'))
                .map(MessageId::new)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    // Drop trailing comments such as "(UTC)"
    let value = value.split('(').next().unwrap_or(value).trim();
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

fn push_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.extend(value.chars().filter(|c| *c != '\r' && *c != '\n'));
    out.push_str("\r\n");
}

/// RFC 2047 encoded-word for non-ASCII header text.
fn encode_word(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!(
            "=?UTF-8?B?{}?=",
            base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
        )
    }
}

fn crlf(body: &str) -> String {
    let mut out = body.replace("\r\n", "\n").replace('\n', "\r\n");
    if !out.ends_with("\r\n") {
        out.push_str("\r\n");
    }
    out
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_article() -> Article {
        Article {
            message_id: MessageId::new("abcd$1700000000@node.example"),
            newsgroup: "overchan.test".to_string(),
            subject: Some("Hello board".to_string()),
            author: DEFAULT_AUTHOR.to_string(),
            references: vec![MessageId::new("root@node.example")],
            date: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            body: "line one\nline two".to_string(),
            attachment: None,
        }
    }

    #[test]
    fn test_to_wire_headers() {
        let wire = sample_article().to_wire();

        assert!(wire.contains("Newsgroups: overchan.test\r\n"));
        assert!(wire.contains("Subject: Hello board\r\n"));
        assert!(wire.contains("Message-ID: <abcd$1700000000@node.example>\r\n"));
        assert!(wire.contains("References: <root@node.example>\r\n"));
        assert!(wire.contains("Path: node.example\r\n"));
        assert!(wire.contains("From: Anonymous <poster@node.example>\r\n"));
        assert!(wire.ends_with("\r\n\r\nline one\r\nline two\r\n"));
    }

    #[test]
    fn test_to_wire_reply_without_subject_and_header_injection() {
        let mut article = sample_article();
        article.subject = None;
        article.author = "evil\r\nX-Injected: yes".to_string();
        let wire = article.to_wire();

        assert!(wire.contains("Subject: None\r\n"));
        assert!(!wire.contains("\r\nX-Injected"));
    }

    #[test]
    fn test_from_wire_plain() {
        let raw = b"From: \"Demo User\" <nobody@example.com>\r\n\
Newsgroups: overchan.test,overchan.random\r\n\
Subject: I am just a test article\r\n\
Message-ID: <45223423@example.com>\r\n\
References: <a@x.com>\r\n <b@x.com>\r\n\
Date: Wed, 06 Oct 1998 04:38:40 -0500\r\n\
\r\n\
This is just a test article body.\r\n";

        let article = Article::from_wire(raw).unwrap();
        assert_eq!(article.message_id, MessageId::new("45223423@example.com"));
        assert_eq!(article.newsgroup, "overchan.test");
        assert_eq!(article.subject.as_deref(), Some("I am just a test article"));
        assert_eq!(article.author, "Demo User");
        assert_eq!(
            article.references,
            vec![MessageId::new("a@x.com"), MessageId::new("b@x.com")]
        );
        assert_eq!(
            article.date,
            Utc.with_ymd_and_hms(1998, 10, 6, 9, 38, 40).unwrap()
        );
        assert_eq!(article.body, "This is just a test article body.");
        assert!(article.attachment.is_none());
    }

    #[test]
    fn test_from_wire_in_reply_to_fallback() {
        let raw = b"Newsgroups: overchan.test\r\n\
Message-ID: <child@x.com>\r\n\
In-Reply-To: <parent@x.com>\r\n\
Date: Mon, 01 Jan 2024 12:00:00 +0000 (UTC)\r\n\
\r\n\
hi\r\n";

        let article = Article::from_wire(raw).unwrap();
        assert_eq!(article.references, vec![MessageId::new("parent@x.com")]);
        assert_eq!(article.subject, None);
        assert_eq!(article.author, DEFAULT_AUTHOR);
    }

    #[test]
    fn test_from_wire_missing_required_headers() {
        let no_id = b"Newsgroups: a.b\r\nDate: Mon, 01 Jan 2024 12:00:00 +0000\r\n\r\nx\r\n";
        assert!(matches!(
            Article::from_wire(no_id),
            Err(Error::MalformedArticle(_))
        ));

        let no_date = b"Newsgroups: a.b\r\nMessage-ID: <1@x>\r\n\r\nx\r\n";
        assert!(matches!(
            Article::from_wire(no_date),
            Err(Error::MalformedArticle(_))
        ));

        let no_separator = b"Just some content without headers";
        assert!(matches!(
            Article::from_wire(no_separator),
            Err(Error::MalformedArticle(_))
        ));
    }

    #[test]
    fn test_wire_round_trip_with_attachment() {
        let mut article = sample_article();
        article.subject = Some("Grüße".to_string());
        article.attachment = Some(Attachment {
            filename: Some("pixel.png".to_string()),
            content_type: "image/png".to_string(),
            data: Bytes::from_static(b"\x89PNG\r\n\x1a\nfake image payload"),
        });

        let wire = article.to_wire();
        assert!(wire.contains("multipart/mixed"));

        let decoded = Article::from_wire(wire.as_bytes()).unwrap();
        assert_eq!(decoded.message_id, article.message_id);
        assert_eq!(decoded.subject.as_deref(), Some("Grüße"));
        assert_eq!(decoded.body, "line one\nline two");
        assert_eq!(decoded.references, article.references);
        assert_eq!(decoded.date, article.date);

        let attachment = decoded.attachment.expect("attachment decoded");
        assert_eq!(attachment.content_type, "image/png");
        assert_eq!(attachment.filename.as_deref(), Some("pixel.png"));
        assert_eq!(attachment.data, article.attachment.unwrap().data);
    }

    #[test]
    fn test_newsgroups_header() {
        let raw = b"Newsgroups: overchan.a, overchan.b\r\nSubject: x\r\n\r\nbody\r\n";
        assert_eq!(newsgroups(raw), vec!["overchan.a", "overchan.b"]);
        assert!(newsgroups(b"no header block").is_empty());
    }

    #[test]
    fn test_parse_header_block_lf_only() {
        let headers = parse_header_block(b"Subject: Test\nX-Long: a\n  b\n\nBody\n").unwrap();
        assert_eq!(header(&headers, "subject"), Some("Test"));
        assert_eq!(header(&headers, "X-Long"), Some("a b"));
    }
}
