//! One NNTP session over an [`AsyncStream`].

use tracing::debug;

use super::client::Client;
use super::command::{ArticleSpec, Command};
use super::error::NntpError;
use super::response::{ActiveGroup, Response};
use super::stream::AsyncStream;

type Result<T> = std::result::Result<T, NntpError>;

/// Async NNTP session combining the sans-io [`Client`] with a stream.
pub struct NntpConnection<S: AsyncStream> {
    client: Client,
    stream: S,
    posting_allowed: bool,
}

impl<S: AsyncStream> NntpConnection<S> {
    /// Connect to `addr` and read the server greeting.
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = S::connect(addr)
            .await
            .map_err(|e| NntpError::Connection(format!("Failed to connect to {addr}: {e}")))?;

        let mut connection = Self {
            client: Client::new(),
            stream,
            posting_allowed: false,
        };

        match connection.read_response().await? {
            Response::ModeReader { posting_allowed } => {
                connection.posting_allowed = posting_allowed;
            }
            Response::Error { code, message } => {
                return Err(NntpError::Protocol { code, message });
            }
            other => {
                return Err(NntpError::InvalidResponse(format!(
                    "Unexpected greeting: {other:?}"
                )));
            }
        }

        Ok(connection)
    }

    /// Whether the server allows posting on this session.
    pub fn is_posting_allowed(&self) -> bool {
        self.posting_allowed
    }

    /// Switch to reader mode.
    pub async fn mode_reader(&mut self) -> Result<bool> {
        match self.send_command(Command::ModeReader).await? {
            Response::ModeReader { posting_allowed } => {
                self.posting_allowed = posting_allowed;
                Ok(posting_allowed)
            }
            // Transit-only servers may not know MODE READER; keep the greeting's answer
            Response::Error { code: 500 | 501, .. } => Ok(self.posting_allowed),
            Response::Error { code, message } => Err(NntpError::Protocol { code, message }),
            _ => Err(NntpError::InvalidResponse(
                "Expected mode reader response".to_string(),
            )),
        }
    }

    /// Authenticate with AUTHINFO USER/PASS.
    pub async fn authenticate(&mut self, username: &str, password: &str) -> Result<()> {
        let response = self
            .send_command(Command::AuthInfoUser(username.to_string()))
            .await?;
        match response {
            Response::AuthSuccess => return Ok(()),
            Response::AuthRequired => {}
            Response::Error { code, message } => return Err(NntpError::Protocol { code, message }),
            _ => {
                return Err(NntpError::InvalidResponse(
                    "Unexpected auth response".to_string(),
                ))
            }
        }

        let response = self
            .send_command(Command::AuthInfoPass(password.to_string()))
            .await?;
        match response {
            Response::AuthSuccess => Ok(()),
            Response::Error { code, message } => Err(NntpError::Protocol { code, message }),
            _ => Err(NntpError::InvalidResponse(
                "Expected auth response".to_string(),
            )),
        }
    }

    /// List active newsgroups.
    pub async fn list_active(&mut self) -> Result<Vec<ActiveGroup>> {
        match self.send_command(Command::ListActive).await? {
            Response::NewsgroupList(groups) => Ok(groups),
            Response::Error { code, message } => Err(NntpError::Protocol { code, message }),
            _ => Err(NntpError::InvalidResponse(
                "Expected newsgroup list".to_string(),
            )),
        }
    }

    /// Select a newsgroup and list its article numbers, optionally within `range`.
    pub async fn listgroup(&mut self, group: &str, range: Option<String>) -> Result<Vec<u64>> {
        match self
            .send_command(Command::ListGroup {
                group: group.to_string(),
                range,
            })
            .await?
        {
            Response::ArticleNumbers(numbers) => Ok(numbers),
            Response::Error { code, message } => Err(NntpError::Protocol { code, message }),
            _ => Err(NntpError::InvalidResponse(
                "Expected article numbers".to_string(),
            )),
        }
    }

    /// Select a newsgroup; returns (count, first, last).
    pub async fn group(&mut self, group: &str) -> Result<(u64, u64, u64)> {
        match self.send_command(Command::Group(group.to_string())).await? {
            Response::GroupSelected {
                count, first, last, ..
            } => Ok((count, first, last)),
            Response::Error { code, message } => Err(NntpError::Protocol { code, message }),
            _ => Err(NntpError::InvalidResponse(
                "Expected group response".to_string(),
            )),
        }
    }

    /// Retrieve a full article; returns the raw, unstuffed content.
    pub async fn article(&mut self, spec: ArticleSpec) -> Result<Vec<u8>> {
        match self.send_command(Command::Article(spec)).await? {
            Response::Article { content, .. } => Ok(content),
            Response::Error { code, message } => Err(NntpError::Protocol { code, message }),
            _ => Err(NntpError::InvalidResponse(
                "Expected article response".to_string(),
            )),
        }
    }

    /// Post an article (headers and body).
    pub async fn post(&mut self, article: &str) -> Result<()> {
        match self.send_command(Command::Post).await? {
            Response::PostAccepted => {
                let content = self.client.encode_article(article)?;
                self.stream
                    .write_all(&content)
                    .await
                    .map_err(|e| NntpError::Io(format!("Failed to send article: {e}")))?;

                match self.read_response().await? {
                    Response::PostSuccess => Ok(()),
                    Response::Error { code, message } => Err(NntpError::Protocol { code, message }),
                    _ => Err(NntpError::InvalidResponse(
                        "Expected post response".to_string(),
                    )),
                }
            }
            Response::Error { code, message } => Err(NntpError::Protocol { code, message }),
            _ => Err(NntpError::InvalidResponse(
                "Expected post ready response".to_string(),
            )),
        }
    }

    /// Quit and close the connection.
    pub async fn quit(mut self) -> Result<()> {
        let _response = self.send_command(Command::Quit).await?;
        self.stream
            .shutdown()
            .await
            .map_err(|e| NntpError::Io(format!("Failed to shutdown connection: {e}")))?;
        Ok(())
    }

    /// Send a command and wait for response.
    async fn send_command(&mut self, command: Command) -> Result<Response> {
        let request = self.client.encode_command(&command)?;
        debug!(command = command.name(), "nntp send");

        self.stream
            .write_all(&request)
            .await
            .map_err(|e| NntpError::Io(format!("Failed to send command: {e}")))?;

        self.read_response().await
    }

    /// Read a complete response from the server.
    async fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some(response) = self.client.decode_response()? {
                return Ok(response);
            }

            let mut buffer = [0; 4096];
            let n = self
                .stream
                .read(&mut buffer)
                .await
                .map_err(|e| NntpError::Io(format!("Failed to read response: {e}")))?;

            if n == 0 {
                return Err(NntpError::Connection(
                    "Connection closed by server".to_string(),
                ));
            }

            self.client.feed_bytes(&buffer[..n]);
        }
    }
}
