//! Sans-IO NNTP client implementation.

use bytes::{BufMut, Bytes, BytesMut};

use super::command::Command;
use super::error::NntpError;
use super::response::{find_crlf, stuff_article, Response};

type Result<T> = std::result::Result<T, NntpError>;

/// Sans-IO NNTP client.
///
/// This client handles protocol logic without performing any I/O operations.
/// It remembers the command in flight so it knows whether the answer is a
/// single line or a dot-terminated block.
pub struct Client {
    read_buffer: BytesMut,
    state: ClientState,
}

#[derive(Debug, Clone, PartialEq)]
enum ClientState {
    /// Waiting for the server greeting
    Connected,
    /// Waiting for the answer to a command
    WaitingForResponse { multiline_code: Option<u16> },
    /// Ready for the next command
    Ready,
    /// Server asked for the article (340)
    Posting,
    /// QUIT sent
    Closed,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Create a new NNTP client instance.
    pub fn new() -> Self {
        Self {
            read_buffer: BytesMut::new(),
            state: ClientState::Connected,
        }
    }

    /// Encode a command for transmission to the server.
    pub fn encode_command(&mut self, command: &Command) -> Result<Bytes> {
        if self.state == ClientState::Closed {
            return Err(NntpError::Connection("session closed".to_string()));
        }
        let bytes = command.encode()?;
        self.state = ClientState::WaitingForResponse {
            multiline_code: command.multiline_code(),
        };
        Ok(Bytes::from(bytes))
    }

    /// Encode an article after a 340 answer to POST.
    pub fn encode_article(&mut self, article: &str) -> Result<Bytes> {
        if self.state != ClientState::Posting {
            return Err(NntpError::InvalidCommand(
                "server has not asked for an article".to_string(),
            ));
        }
        self.state = ClientState::WaitingForResponse {
            multiline_code: None,
        };
        Ok(Bytes::from(stuff_article(article)))
    }

    /// Feed received data from the server into the client.
    pub fn feed_bytes(&mut self, data: &[u8]) {
        self.read_buffer.put_slice(data);
    }

    /// Try to decode a complete response from buffered data.
    ///
    /// Returns `Ok(Some(response))` if a complete response is available,
    /// `Ok(None)` if more data is needed, or an error if parsing fails.
    pub fn decode_response(&mut self) -> Result<Option<Response>> {
        let multiline_code = match &self.state {
            ClientState::WaitingForResponse { multiline_code } => *multiline_code,
            _ => None,
        };

        let Some((data, multiline)) = self.extract_complete_response(multiline_code) else {
            return Ok(None);
        };
        let response = Response::parse(&data, multiline)?;
        self.update_state_for_response(&response);
        Ok(Some(response))
    }

    /// Whether the client can send a command.
    pub fn is_ready(&self) -> bool {
        self.state == ClientState::Ready
    }

    fn extract_complete_response(&mut self, multiline_code: Option<u16>) -> Option<(Vec<u8>, bool)> {
        let end_pos = find_crlf(&self.read_buffer)?;
        if end_pos < 3 {
            // Not a status line; hand it to the parser to reject
            let response = self.read_buffer.split_to(end_pos + 2).to_vec();
            return Some((response, false));
        }

        let code = parse_status_code(&self.read_buffer[..3]);
        let multiline = code.is_some() && code == multiline_code;
        if multiline {
            // The terminator may directly follow the status line
            let term_pos = find_terminator(&self.read_buffer[end_pos..])? + end_pos;
            let response = self.read_buffer.split_to(term_pos + 5).to_vec();
            Some((response, true))
        } else {
            let response = self.read_buffer.split_to(end_pos + 2).to_vec();
            Some((response, false))
        }
    }

    fn update_state_for_response(&mut self, response: &Response) {
        self.state = match response {
            Response::PostAccepted => ClientState::Posting,
            Response::Quit => ClientState::Closed,
            _ => ClientState::Ready,
        };
    }
}

/// Find the position of the multiline terminator "\r\n.\r\n" in the buffer.
fn find_terminator(data: &[u8]) -> Option<usize> {
    data.windows(5).position(|window| window == b"\r\n.\r\n")
}

/// Parse a 3-digit ASCII status code from bytes.
fn parse_status_code(data: &[u8]) -> Option<u16> {
    if data.len() < 3 || !data[..3].iter().all(u8::is_ascii_digit) {
        return None;
    }
    let code = (data[0] - b'0') as u16 * 100 + (data[1] - b'0') as u16 * 10 + (data[2] - b'0') as u16;
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nntp::command::ArticleSpec;

    #[test]
    fn test_client_greeting() {
        let mut client = Client::new();
        assert!(!client.is_ready());

        client.feed_bytes(b"200 ready\r\n");
        let response = client.decode_response().unwrap().unwrap();
        assert_eq!(
            response,
            Response::ModeReader {
                posting_allowed: true
            }
        );
        assert!(client.is_ready());
    }

    #[test]
    fn test_partial_multiline_response() {
        let mut client = Client::new();
        client
            .encode_command(&Command::Article(ArticleSpec::Number(1)))
            .unwrap();

        client.feed_bytes(b"220 1 <a@b>\r\nSubject: x\r\n");
        assert!(client.decode_response().unwrap().is_none());

        client.feed_bytes(b"\r\nbody\r\n.\r\n");
        let response = client.decode_response().unwrap().unwrap();
        assert!(matches!(response, Response::Article { .. }));
    }

    #[test]
    fn test_error_answer_to_multiline_command_is_single_line() {
        let mut client = Client::new();
        client
            .encode_command(&Command::Article(ArticleSpec::Number(1)))
            .unwrap();

        client.feed_bytes(b"423 no such article number\r\n");
        let response = client.decode_response().unwrap().unwrap();
        assert_eq!(
            response,
            Response::Error {
                code: 423,
                message: "no such article number".to_string()
            }
        );
    }

    #[test]
    fn test_group_vs_listgroup_211() {
        let mut client = Client::new();
        client
            .encode_command(&Command::Group("g".to_string()))
            .unwrap();
        client.feed_bytes(b"211 2 1 2 g\r\n");
        assert!(matches!(
            client.decode_response().unwrap().unwrap(),
            Response::GroupSelected { .. }
        ));

        client
            .encode_command(&Command::ListGroup {
                group: "g".to_string(),
                range: None,
            })
            .unwrap();
        client.feed_bytes(b"211 2 1 2 g list follows\r\n1\r\n2\r\n.\r\n");
        assert_eq!(
            client.decode_response().unwrap().unwrap(),
            Response::ArticleNumbers(vec![1, 2])
        );
    }

    #[test]
    fn test_post_flow() {
        let mut client = Client::new();
        assert!(client.encode_article("x").is_err());

        client.encode_command(&Command::Post).unwrap();
        client.feed_bytes(b"340 send article\r\n");
        assert_eq!(
            client.decode_response().unwrap().unwrap(),
            Response::PostAccepted
        );

        let bytes = client.encode_article("Subject: x\r\n\r\nbody").unwrap();
        assert!(bytes.ends_with(b"body\r\n.\r\n"));

        client.feed_bytes(b"240 article posted\r\n");
        assert_eq!(
            client.decode_response().unwrap().unwrap(),
            Response::PostSuccess
        );
    }

    #[test]
    fn test_closed_client_rejects_commands() {
        let mut client = Client::new();
        client.encode_command(&Command::Quit).unwrap();
        client.feed_bytes(b"205 bye\r\n");
        client.decode_response().unwrap();
        assert!(client.encode_command(&Command::ModeReader).is_err());
    }
}
