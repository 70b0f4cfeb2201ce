//! Post validation and article construction.
//!
//! A submission goes through two steps:
//!
//! 1. [`PostValidator::check`]: field rules that need no I/O (subject for
//!    thread roots, body size, allow-listed newsgroup, attachment limits,
//!    parent id syntax)
//! 2. [`PostValidator::build`]: given the resolved parent (if any), produce
//!    the [`Article`] to inject, with a fresh Message-ID and the parent's
//!    References chain
//!
//! Parent existence is resolved by the frontend between the two steps since
//! it needs the cache or the backend. Both steps fail with
//! [`Error::ValidationFailed`] and never hand out a partial article.

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::article::{Article, Attachment, MessageId, DEFAULT_AUTHOR};
use crate::config::FrontendConfig;
use crate::error::{Error, Result};
use crate::threading::normalize_subject;

/// An attachment as uploaded by the poster.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentUpload {
    /// Filename supplied by the client, if any
    pub filename: Option<String>,
    /// Declared MIME type
    pub content_type: String,
    /// Raw bytes
    pub data: Bytes,
}

/// A post submission, as received from the HTTP layer.
#[derive(Debug, Clone, PartialEq)]
pub struct PostRequest {
    /// Target newsgroup
    pub newsgroup: String,
    /// Message-ID of the article being replied to; `None` starts a thread
    pub parent: Option<MessageId>,
    /// Subject line; required for new threads
    pub subject: Option<String>,
    /// Poster name; defaults to "Anonymous"
    pub name: Option<String>,
    /// Text body
    pub body: String,
    /// Optional attachment
    pub attachment: Option<AttachmentUpload>,
}

impl PostRequest {
    /// A submission starting a new thread.
    pub fn new_thread(
        newsgroup: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            newsgroup: newsgroup.into(),
            parent: None,
            subject: Some(subject.into()),
            name: None,
            body: body.into(),
            attachment: None,
        }
    }

    /// A submission replying to `parent`.
    pub fn reply(
        newsgroup: impl Into<String>,
        parent: impl Into<MessageId>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            newsgroup: newsgroup.into(),
            parent: Some(parent.into()),
            subject: None,
            name: None,
            body: body.into(),
            attachment: None,
        }
    }

    /// Set the subject.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set the poster name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach a file.
    pub fn with_attachment(mut self, attachment: AttachmentUpload) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// Whether this submission is a reply.
    pub fn is_reply(&self) -> bool {
        self.parent.is_some()
    }

    fn trimmed_subject(&self) -> Option<&str> {
        self.subject
            .as_deref()
            .map(str::trim)
            .filter(|subject| !subject.is_empty())
    }
}

/// Applies the posting rules of a [`FrontendConfig`].
#[derive(Debug, Clone, Copy)]
pub struct PostValidator<'a> {
    config: &'a FrontendConfig,
}

impl<'a> PostValidator<'a> {
    /// Create a validator for the given limits.
    pub fn new(config: &'a FrontendConfig) -> Self {
        Self { config }
    }

    /// Check every rule that does not need the backend.
    pub fn check(&self, request: &PostRequest) -> Result<()> {
        let config = self.config;

        if !config.allows_newsgroup(&request.newsgroup) {
            return Err(Error::validation(
                "newsgroup",
                format!("newsgroup {:?} is not accepting posts", request.newsgroup),
            ));
        }

        if let Some(parent) = &request.parent {
            if !parent.is_safe() {
                return Err(Error::validation("parent", "malformed Message-ID"));
            }
        }

        match request.trimmed_subject() {
            None if !request.is_reply() => {
                return Err(Error::validation("subject", "required for new threads"));
            }
            Some(subject) => {
                if subject.chars().count() > config.max_subject_len {
                    return Err(Error::validation(
                        "subject",
                        format!("longer than {} characters", config.max_subject_len),
                    ));
                }
                if subject.chars().any(char::is_control) {
                    return Err(Error::validation("subject", "contains control characters"));
                }
            }
            None => {}
        }

        if let Some(name) = request.name.as_deref().map(str::trim) {
            if name.chars().count() > config.max_name_len {
                return Err(Error::validation(
                    "name",
                    format!("longer than {} characters", config.max_name_len),
                ));
            }
            if name.chars().any(char::is_control) {
                return Err(Error::validation("name", "contains control characters"));
            }
        }

        if request.body.trim().is_empty() {
            return Err(Error::validation("body", "must not be empty"));
        }
        if request.body.len() > config.max_body_bytes {
            return Err(Error::validation(
                "body",
                format!("larger than {} bytes", config.max_body_bytes),
            ));
        }

        if let Some(attachment) = &request.attachment {
            self.check_attachment(attachment)?;
        }

        Ok(())
    }

    fn check_attachment(&self, attachment: &AttachmentUpload) -> Result<()> {
        let config = self.config;

        if attachment.data.is_empty() {
            return Err(Error::validation("attachment", "empty file"));
        }
        if attachment.data.len() > config.max_attachment_bytes {
            return Err(Error::validation(
                "attachment",
                format!("larger than {} bytes", config.max_attachment_bytes),
            ));
        }
        if !config.allows_attachment_type(attachment.content_type.trim()) {
            return Err(Error::validation(
                "attachment",
                format!("content type {:?} not allowed", attachment.content_type),
            ));
        }
        if let Some(filename) = &attachment.filename {
            if filename
                .chars()
                .any(|c| c.is_control() || matches!(c, '/' | '\\' | '"'))
            {
                return Err(Error::validation("attachment", "invalid filename"));
            }
        }
        Ok(())
    }

    /// Validate and build the article for `request`.
    ///
    /// `parent` must be the resolved article named by `request.parent`, and
    /// must live in the same newsgroup.
    pub fn build(&self, request: PostRequest, parent: Option<&Article>) -> Result<Article> {
        self.build_at(request, parent, Utc::now())
    }

    pub(crate) fn build_at(
        &self,
        request: PostRequest,
        parent: Option<&Article>,
        date: DateTime<Utc>,
    ) -> Result<Article> {
        self.check(&request)?;

        let mut builder = ArticleBuilder::new(&request.newsgroup).date(date);

        match (&request.parent, parent) {
            (None, _) => {}
            (Some(expected), Some(parent)) if &parent.message_id == expected => {
                if parent.newsgroup != request.newsgroup {
                    return Err(Error::validation(
                        "parent",
                        format!("{expected} belongs to {}", parent.newsgroup),
                    ));
                }
                builder = builder.in_reply_to(parent);
            }
            (Some(expected), _) => {
                return Err(Error::validation(
                    "parent",
                    format!("{expected} does not exist"),
                ));
            }
        }

        if let Some(subject) = request.trimmed_subject() {
            builder = builder.subject(subject);
        }
        if let Some(name) = request.name.as_deref().map(str::trim) {
            builder = builder.author(name);
        }
        if let Some(upload) = request.attachment {
            builder = builder.attachment(Attachment {
                filename: upload.filename,
                content_type: upload.content_type.trim().to_ascii_lowercase(),
                data: upload.data,
            });
        }

        builder
            .body(request.body)
            .build(&self.config.instance_name)
    }
}

/// Builder for articles injected by this gateway.
///
/// Assigns the Message-ID on [`ArticleBuilder::build`], so every built
/// article carries a fresh one.
#[derive(Debug, Clone)]
struct ArticleBuilder {
    newsgroup: String,
    subject: Option<String>,
    author: Option<String>,
    references: Vec<MessageId>,
    inherited_subject: Option<String>,
    date: DateTime<Utc>,
    body: String,
    attachment: Option<Attachment>,
}

impl ArticleBuilder {
    fn new(newsgroup: impl Into<String>) -> Self {
        Self {
            newsgroup: newsgroup.into(),
            subject: None,
            author: None,
            references: Vec::new(),
            inherited_subject: None,
            date: Utc::now(),
            body: String::new(),
            attachment: None,
        }
    }

    fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }

    fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// Make this article a reply to `parent`.
    ///
    /// References become the parent's chain plus the parent's id; without an
    /// explicit subject the reply inherits "Re: " and the thread subject.
    fn in_reply_to(mut self, parent: &Article) -> Self {
        self.references = parent.reply_references();
        self.inherited_subject = parent
            .subject
            .as_deref()
            .map(normalize_subject)
            .filter(|subject| !subject.is_empty())
            .map(|subject| format!("Re: {subject}"));
        self
    }

    fn build(self, instance: &str) -> Result<Article> {
        if self.body.trim().is_empty() {
            return Err(Error::validation("body", "must not be empty"));
        }
        if self.references.is_empty() && self.subject.is_none() {
            return Err(Error::validation("subject", "required for new threads"));
        }

        let author = self
            .author
            .filter(|author| !author.is_empty())
            .unwrap_or_else(|| DEFAULT_AUTHOR.to_string());

        Ok(Article {
            message_id: MessageId::generate(instance),
            newsgroup: self.newsgroup,
            subject: self.subject.or(self.inherited_subject),
            author,
            references: self.references,
            date: self.date,
            body: self.body.trim_end().to_string(),
            attachment: self.attachment,
        })
    }
}
