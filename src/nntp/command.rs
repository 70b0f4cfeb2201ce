//! NNTP command types and encoding.

use super::error::NntpError;

type Result<T> = std::result::Result<T, NntpError>;

/// NNTP commands the adapter sends.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Switch to reader mode
    ModeReader,

    /// Authenticate with username
    AuthInfoUser(String),

    /// Authenticate with password
    AuthInfoPass(String),

    /// List active newsgroups
    ListActive,

    /// Select a newsgroup
    Group(String),

    /// List article numbers of a newsgroup, optionally within a range
    ListGroup {
        /// Newsgroup to select
        group: String,
        /// Range such as "100-" or "100-200"
        range: Option<String>,
    },

    /// Retrieve a full article
    Article(ArticleSpec),

    /// Start posting an article
    Post,

    /// Terminate connection
    Quit,
}

/// Article specification - either message-id or article number
#[derive(Debug, Clone, PartialEq)]
pub enum ArticleSpec {
    /// Article number within the selected group
    Number(u64),
    /// Message-ID in angle brackets
    MessageId(String),
}

impl Command {
    /// Encode command as bytes for transmission to server
    pub fn encode(&self) -> Result<Vec<u8>> {
        let command_line = match self {
            Command::ModeReader => "MODE READER".to_string(),
            Command::AuthInfoUser(user) => {
                validate_token(user)?;
                format!("AUTHINFO USER {user}")
            }
            Command::AuthInfoPass(pass) => {
                validate_parameter(pass)?;
                format!("AUTHINFO PASS {pass}")
            }
            Command::ListActive => "LIST ACTIVE".to_string(),
            Command::Group(group) => {
                validate_token(group)?;
                format!("GROUP {group}")
            }
            Command::ListGroup { group, range } => {
                validate_token(group)?;
                match range {
                    Some(range) => {
                        validate_token(range)?;
                        format!("LISTGROUP {group} {range}")
                    }
                    None => format!("LISTGROUP {group}"),
                }
            }
            Command::Article(spec) => format!("ARTICLE {}", spec.encode()?),
            Command::Post => "POST".to_string(),
            Command::Quit => "QUIT".to_string(),
        };

        let mut bytes = command_line.into_bytes();
        bytes.extend_from_slice(b"\r\n");
        Ok(bytes)
    }

    /// The success code whose response carries a dot-terminated block.
    pub fn multiline_code(&self) -> Option<u16> {
        match self {
            Command::ListActive => Some(215),
            Command::ListGroup { .. } => Some(211),
            Command::Article(_) => Some(220),
            _ => None,
        }
    }

    /// Command verb for logging; never includes arguments.
    pub fn name(&self) -> &'static str {
        match self {
            Command::ModeReader => "MODE READER",
            Command::AuthInfoUser(_) => "AUTHINFO USER",
            Command::AuthInfoPass(_) => "AUTHINFO PASS",
            Command::ListActive => "LIST ACTIVE",
            Command::Group(_) => "GROUP",
            Command::ListGroup { .. } => "LISTGROUP",
            Command::Article(_) => "ARTICLE",
            Command::Post => "POST",
            Command::Quit => "QUIT",
        }
    }
}

impl ArticleSpec {
    fn encode(&self) -> Result<String> {
        match self {
            ArticleSpec::Number(num) => Ok(num.to_string()),
            ArticleSpec::MessageId(id) => {
                if !id.starts_with('<') || !id.ends_with('>') {
                    return Err(NntpError::InvalidCommand(
                        "Message-ID must be enclosed in angle brackets".to_string(),
                    ));
                }
                validate_token(id)?;
                Ok(id.clone())
            }
        }
    }
}

/// Validate that a parameter doesn't contain invalid characters
fn validate_parameter(param: &str) -> Result<()> {
    if param.contains('\r') || param.contains('\n') {
        return Err(NntpError::InvalidCommand(
            "Parameters cannot contain line breaks".to_string(),
        ));
    }
    if param.is_empty() {
        return Err(NntpError::InvalidCommand(
            "Parameters cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Like [`validate_parameter`], for arguments that must be a single word
fn validate_token(param: &str) -> Result<()> {
    validate_parameter(param)?;
    if param.contains(char::is_whitespace) {
        return Err(NntpError::InvalidCommand(
            "Parameters cannot contain spaces".to_string(),
        ));
    }
    Ok(())
}
