//! Error types for the frontend core.
//!
//! Every operation exposed to the HTTP handlers returns [`Result`]. The
//! variants form a small taxonomy the handler layer can map to responses:
//!
//! - caller errors: [`Error::ValidationFailed`]
//! - not found: [`Error::UnknownNewsgroup`], [`Error::ThreadNotFound`], [`Error::ArticleNotFound`]
//! - transient infrastructure: [`Error::BackendUnavailable`], [`Error::BackendTimeout`]
//! - backend rejection: [`Error::InjectionFailed`]

use std::time::Duration;

use thiserror::Error;

use crate::article::MessageId;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the frontend and the article store boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A post submission was rejected before any backend call was made.
    #[error("validation failed for {field}: {reason}")]
    ValidationFailed {
        /// Name of the offending request field
        field: &'static str,
        /// Human-readable reason
        reason: String,
    },

    /// The backend does not carry the requested newsgroup.
    #[error("unknown newsgroup: {0}")]
    UnknownNewsgroup(String),

    /// No thread rooted at the given Message-ID exists in the newsgroup.
    #[error("thread {root} not found in {newsgroup}")]
    ThreadNotFound {
        /// Newsgroup that was searched
        newsgroup: String,
        /// Requested root Message-ID
        root: MessageId,
    },

    /// The backend has no article with this Message-ID.
    #[error("article not found: {0}")]
    ArticleNotFound(MessageId),

    /// The backend could not be reached or the session broke.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A backend call did not complete within the configured timeout.
    #[error("backend call {operation} timed out after {after:?}")]
    BackendTimeout {
        /// The store operation that timed out
        operation: &'static str,
        /// The timeout that elapsed
        after: Duration,
    },

    /// The backend refused an otherwise valid article.
    #[error("injection failed: {0}")]
    InjectionFailed(String),

    /// The backend returned an article that could not be decoded.
    #[error("malformed article: {0}")]
    MalformedArticle(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for building a [`Error::ValidationFailed`].
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Error::ValidationFailed {
            field,
            reason: reason.into(),
        }
    }

    /// Transient infrastructure failures the caller may retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::BackendUnavailable(_) | Error::BackendTimeout { .. }
        )
    }

    /// Terminal not-found conditions.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::UnknownNewsgroup(_) | Error::ThreadNotFound { .. } | Error::ArticleNotFound(_)
        )
    }

    /// Caller input errors; no backend side effect happened.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::ValidationFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(Error::BackendUnavailable("down".into()).is_transient());
        assert!(Error::BackendTimeout {
            operation: "list_articles",
            after: Duration::from_secs(1),
        }
        .is_transient());
        assert!(!Error::InjectionFailed("441".into()).is_transient());

        assert!(Error::UnknownNewsgroup("x".into()).is_not_found());
        assert!(Error::ArticleNotFound(MessageId::new("a@b")).is_not_found());
        assert!(!Error::validation("body", "empty").is_not_found());

        assert!(Error::validation("body", "empty").is_validation());
    }

    #[test]
    fn test_error_display() {
        let err = Error::validation("subject", "required for new threads");
        assert_eq!(
            err.to_string(),
            "validation failed for subject: required for new threads"
        );

        let err = Error::ThreadNotFound {
            newsgroup: "overchan.test".into(),
            root: MessageId::new("<1@host>"),
        };
        assert_eq!(err.to_string(), "thread 1@host not found in overchan.test");
    }
}
