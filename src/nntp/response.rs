//! NNTP response types and parsing.

use super::error::NntpError;

type Result<T> = std::result::Result<T, NntpError>;

/// One line of a `LIST ACTIVE` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveGroup {
    /// Newsgroup name
    pub name: String,
    /// Highest article number
    pub last: u64,
    /// Lowest article number
    pub first: u64,
    /// Posting status flag (`y`, `n`, `m`, ...)
    pub status: char,
}

/// NNTP server responses the adapter understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Greeting or MODE READER answer (200/201)
    ModeReader {
        /// Whether posting is allowed
        posting_allowed: bool,
    },

    /// Authentication accepted (281)
    AuthSuccess,

    /// Password required (381)
    AuthRequired,

    /// Newsgroup list (215)
    NewsgroupList(Vec<ActiveGroup>),

    /// Group selected (211 after GROUP)
    GroupSelected {
        /// Estimated article count
        count: u64,
        /// Lowest article number
        first: u64,
        /// Highest article number
        last: u64,
        /// Group name
        name: String,
    },

    /// Article numbers (211 after LISTGROUP)
    ArticleNumbers(Vec<u64>),

    /// Full article (220)
    Article {
        /// Article number, if the server reported one
        number: Option<u64>,
        /// Message-ID as sent by the server
        message_id: String,
        /// Raw article, dot-unstuffed, CRLF line endings
        content: Vec<u8>,
    },

    /// Send the article to be posted (340)
    PostAccepted,

    /// Article posted (240)
    PostSuccess,

    /// Closing connection (205)
    Quit,

    /// Any other success code
    Success {
        /// Response code
        code: u16,
        /// Response text
        message: String,
    },

    /// 4xx and 5xx responses
    Error {
        /// Response code
        code: u16,
        /// Response text
        message: String,
    },
}

/// Decode bytes to text, trying common NNTP charsets.
///
/// UTF-8 first, then Windows-1252 (ISO-8859-1 superset), ISO-8859-15 and
/// ISO-8859-2, then lossy UTF-8.
pub(crate) fn decode_text_with_encoding(data: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(data) {
        return text.to_string();
    }

    let encodings_to_try = [
        encoding_rs::WINDOWS_1252,
        encoding_rs::ISO_8859_15,
        encoding_rs::ISO_8859_2,
    ];

    for encoding in &encodings_to_try {
        let (decoded, _, had_errors) = encoding.decode(data);
        if !had_errors {
            return decoded.into_owned();
        }
    }

    String::from_utf8_lossy(data).into_owned()
}

impl Response {
    /// Parse a complete response.
    ///
    /// `multiline` says whether `data` carries a dot-terminated block after
    /// the status line; the block is dot-unstuffed before interpretation.
    pub fn parse(data: &[u8], multiline: bool) -> Result<Self> {
        let status_end = find_crlf(data).unwrap_or(data.len());
        let status_line = decode_text_with_encoding(&data[..status_end]);
        let (code, message) = parse_status_line(&status_line)?;

        let block = if multiline {
            let start = (status_end + 2).min(data.len());
            unstuff_block(&data[start..])
        } else {
            Vec::new()
        };

        match code {
            200 => Ok(Response::ModeReader {
                posting_allowed: true,
            }),
            201 => Ok(Response::ModeReader {
                posting_allowed: false,
            }),
            205 => Ok(Response::Quit),
            211 if multiline => {
                let numbers = block
                    .iter()
                    .filter_map(|line| std::str::from_utf8(line).ok())
                    .filter_map(|line| line.trim().parse::<u64>().ok())
                    .collect();
                Ok(Response::ArticleNumbers(numbers))
            }
            211 => parse_group_response(&message),
            215 => {
                let groups = block
                    .iter()
                    .map(|line| decode_text_with_encoding(line))
                    .filter_map(|line| parse_active_line(&line))
                    .collect();
                Ok(Response::NewsgroupList(groups))
            }
            220 => parse_article_response(&message, &block),
            240 => Ok(Response::PostSuccess),
            281 => Ok(Response::AuthSuccess),
            340 => Ok(Response::PostAccepted),
            381 => Ok(Response::AuthRequired),
            400..=599 => Ok(Response::Error { code, message }),
            _ => {
                if (100..400).contains(&code) {
                    Ok(Response::Success { code, message })
                } else {
                    Ok(Response::Error { code, message })
                }
            }
        }
    }
}

/// Split a dot-terminated block into lines, undoing dot-stuffing.
///
/// The block is everything after the status line, terminator included.
fn unstuff_block(data: &[u8]) -> Vec<&[u8]> {
    let mut lines = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        let (line, next) = match find_crlf(rest) {
            Some(pos) => (&rest[..pos], &rest[pos + 2..]),
            None => (rest, &rest[rest.len()..]),
        };
        if line == b"." {
            break;
        }
        lines.push(line.strip_prefix(b".").unwrap_or(line));
        rest = next;
    }
    lines
}

/// Apply dot-stuffing to an outgoing article and append the terminator.
///
/// Bare LF line endings are normalized to CRLF.
pub(crate) fn stuff_article(article: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(article.len() + 16);
    for line in article.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.starts_with('.') {
            out.push(b'.');
        }
        out.extend_from_slice(line.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    // split leaves an empty final piece after a trailing newline
    if article.ends_with('\n') {
        out.truncate(out.len() - 2);
    }
    out.extend_from_slice(b".\r\n");
    out
}

/// Find the position of the first CRLF sequence in the buffer.
pub(crate) fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|pair| pair == b"\r\n")
}

fn parse_status_line(line: &str) -> Result<(u16, String)> {
    let (code, message) = line.split_once(' ').unwrap_or((line, ""));
    if code.len() != 3 {
        return Err(NntpError::Parse(format!("Invalid status line: {line}")));
    }
    let code = code
        .parse::<u16>()
        .map_err(|_| NntpError::Parse(format!("Invalid response code: {code}")))?;
    Ok((code, message.trim_end().to_string()))
}

fn parse_group_response(message: &str) -> Result<Response> {
    let parts: Vec<&str> = message.split_whitespace().collect();
    if parts.len() < 4 {
        return Err(NntpError::Parse(format!("Invalid group response: {message}")));
    }

    let count = parts[0]
        .parse::<u64>()
        .map_err(|_| NntpError::Parse("Invalid article count".to_string()))?;
    let first = parts[1]
        .parse::<u64>()
        .map_err(|_| NntpError::Parse("Invalid first article number".to_string()))?;
    let last = parts[2]
        .parse::<u64>()
        .map_err(|_| NntpError::Parse("Invalid last article number".to_string()))?;
    let name = parts[3].to_string();

    Ok(Response::GroupSelected {
        count,
        first,
        last,
        name,
    })
}

fn parse_article_response(message: &str, block: &[&[u8]]) -> Result<Response> {
    let parts: Vec<&str> = message.split_whitespace().collect();
    if parts.len() < 2 {
        return Err(NntpError::Parse(format!("Invalid article response: {message}")));
    }

    let number = match parts[0] {
        "0" => None,
        n => Some(
            n.parse::<u64>()
                .map_err(|_| NntpError::Parse("Invalid article number".to_string()))?,
        ),
    };
    let message_id = parts[1].to_string();

    let mut content = Vec::new();
    for line in block {
        content.extend_from_slice(line);
        content.extend_from_slice(b"\r\n");
    }

    Ok(Response::Article {
        number,
        message_id,
        content,
    })
}

fn parse_active_line(line: &str) -> Option<ActiveGroup> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 4 {
        return None;
    }

    Some(ActiveGroup {
        name: parts[0].to_string(),
        last: parts[1].parse::<u64>().ok()?,
        first: parts[2].parse::<u64>().ok()?,
        status: parts[3].chars().next()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_greeting() {
        let response = Response::parse(b"200 news.example ready\r\n", false).unwrap();
        assert_eq!(
            response,
            Response::ModeReader {
                posting_allowed: true
            }
        );
        let response = Response::parse(b"201 read only\r\n", false).unwrap();
        assert_eq!(
            response,
            Response::ModeReader {
                posting_allowed: false
            }
        );
    }

    #[test]
    fn test_parse_group_selected() {
        let response = Response::parse(b"211 3 1 3 overchan.test\r\n", false).unwrap();
        assert_eq!(
            response,
            Response::GroupSelected {
                count: 3,
                first: 1,
                last: 3,
                name: "overchan.test".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_listgroup() {
        let data = b"211 3 1 3 overchan.test list follows\r\n1\r\n2\r\n3\r\n.\r\n";
        let response = Response::parse(data, true).unwrap();
        assert_eq!(response, Response::ArticleNumbers(vec![1, 2, 3]));

        let empty = Response::parse(b"211 0 0 0 overchan.test\r\n.\r\n", true).unwrap();
        assert_eq!(empty, Response::ArticleNumbers(vec![]));
    }

    #[test]
    fn test_parse_list_active() {
        let data = b"215 list follows\r\noverchan.test 12 1 y\r\nctl 0 1 n\r\nbroken\r\n.\r\n";
        let Response::NewsgroupList(groups) = Response::parse(data, true).unwrap() else {
            panic!("expected newsgroup list");
        };
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "overchan.test");
        assert_eq!(groups[0].last, 12);
        assert_eq!(groups[1].status, 'n');
    }

    #[test]
    fn test_parse_article_unstuffs_dots() {
        let data = b"220 7 <a@b> article\r\nSubject: x\r\n\r\n..leading dot\r\n...\r\nend\r\n.\r\n";
        let response = Response::parse(data, true).unwrap();
        let Response::Article {
            number,
            message_id,
            content,
        } = response
        else {
            panic!("expected article");
        };
        assert_eq!(number, Some(7));
        assert_eq!(message_id, "<a@b>");
        assert_eq!(content, b"Subject: x\r\n\r\n.leading dot\r\n..\r\nend\r\n");
    }

    #[test]
    fn test_parse_error_response() {
        let response = Response::parse(b"430 No such article\r\n", false).unwrap();
        assert_eq!(
            response,
            Response::Error {
                code: 430,
                message: "No such article".to_string()
            }
        );
    }

    #[test]
    fn test_parse_invalid_status() {
        assert!(Response::parse(b"hello\r\n", false).is_err());
        assert!(Response::parse(b"20x oops\r\n", false).is_err());
    }

    #[test]
    fn test_decode_text_with_encoding() {
        assert_eq!(decode_text_with_encoding(b"plain"), "plain");
        // "café" in Windows-1252
        assert_eq!(decode_text_with_encoding(b"caf\xe9"), "café");
    }

    #[test]
    fn test_stuff_article() {
        let stuffed = stuff_article("Subject: x\n\n.hidden\nlast\n");
        assert_eq!(stuffed, b"Subject: x\r\n\r\n..hidden\r\nlast\r\n.\r\n");

        let stuffed = stuff_article("a\r\nb");
        assert_eq!(stuffed, b"a\r\nb\r\n.\r\n");
    }
}
